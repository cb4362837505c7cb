#![allow(clippy::doc_markdown)] // Generated file contains OPT_LEVEL without backticks

//! Build-time version information generated by `built`.

use std::sync::LazyLock;

include!(concat!(env!("OUT_DIR"), "/built.rs"));

/// Package version, followed by the short git commit and a `-dirty` marker when built from
/// a modified checkout.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    let dirty = if GIT_DIRTY == Some(true) { "-dirty" } else { "" };
    match GIT_COMMIT_HASH_SHORT {
        Some(hash) => format!("{PKG_VERSION}-{hash}{dirty}"),
        None => PKG_VERSION.to_string(),
    }
});
