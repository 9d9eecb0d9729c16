//! Statically embedded dashboard shell.

use rust_embed::RustEmbed;

/// Files compiled into the binary from `ui/dist/`.
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/ui/dist/"]
pub struct Assets;
