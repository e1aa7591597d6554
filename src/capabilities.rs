//! Server capability declarations for the Prettier LSP.

use tower_lsp::lsp_types::*;

/// Returns the server capabilities to be sent during initialization.
///
/// Declares:
/// - Incremental text document sync (open/change/close)
/// - Document formatting
/// - Range formatting
pub fn server_capabilities() -> ServerCapabilities {
    ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Options(
            TextDocumentSyncOptions {
                open_close: Some(true),
                change: Some(TextDocumentSyncKind::INCREMENTAL),
                ..Default::default()
            },
        )),
        document_formatting_provider: Some(OneOf::Left(true)),
        document_range_formatting_provider: Some(OneOf::Left(true)),
        ..Default::default()
    }
}
