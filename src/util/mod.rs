//! Helpers shared by the resolver and the CLI.
//!
//! - **Source URL validation**: rejects non-HTTP schemes and internal hosts
//!   in untrusted source lists (SSRF protection)

mod source_url;

pub use source_url::{parse_source_list, redirect_policy, validate_source_url, SourceUrlError};
