//! # bioweave-sandbox
//!
//! Docker-backed execution sandbox for bioweave agents: container
//! lifecycle, tar-based upload/download, bounded code execution with
//! memory/time metrics, artifact collection, and middle-token output
//! truncation.
//!
//! ```rust,ignore
//! use bioweave_sandbox::{Language, Sandbox, UploadPayload, DEFAULT_IMAGE};
//!
//! let sandbox = Sandbox::start(DEFAULT_IMAGE).await?;
//! sandbox
//!     .upload(UploadPayload::from("x,y\n1,2\n"), "/workdir/data.csv")
//!     .await?;
//!
//! let result = sandbox
//!     .execute(Language::Python, "import pandas as pd; print(pd.read_csv('data.csv').sum())")
//!     .await?;
//! assert_eq!(result.exit_code, 0);
//!
//! sandbox.stop().await?;
//! ```

pub mod error;
pub mod interface;
pub mod result;
pub mod table;
pub mod truncate;

pub use error::{Result, SandboxError};
pub use interface::{Language, Sandbox, DEFAULT_IMAGE, DEFAULT_RAW_OUTPUT_CAP, DEFAULT_WORKDIR};
pub use result::CodeExecutionResult;
pub use table::{Table, UploadPayload};
pub use truncate::{approximate_token_count, truncate_middle_tokens, TRUNCATION_MARKER};
