//! Prettier Language Server
//!
//! Serves `textDocument/formatting` and `textDocument/rangeFormatting` over stdio,
//! delegating the actual formatting to a Prettier module run through `node`.

use std::path::PathBuf;

use clap::Parser;
use tower_lsp::{LspService, Server};

use prettier_lsp::backend::{Backend, DID_CHANGE_TRUST_METHOD, FORCE_FORMAT_METHOD};
use prettier_lsp::module_resolver::ModuleResolverOptions;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Communicate over stdio. Always on; accepted because editors pass it.
    #[arg(long)]
    stdio: bool,

    /// Node.js executable used to run Prettier.
    #[arg(long, default_value = "node")]
    node_path: PathBuf,

    /// Prettier module directory used when no project or global install is found.
    #[arg(long)]
    bundled_prettier: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    log::info!("Starting Prettier LSP (node: {})", args.node_path.display());

    let options = ModuleResolverOptions {
        node_path: args.node_path,
        bundled_prettier: args.bundled_prettier,
    };

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::build(move |client| Backend::with_options(client, options))
        .custom_method(DID_CHANGE_TRUST_METHOD, Backend::did_change_trust)
        .custom_method(FORCE_FORMAT_METHOD, Backend::force_format_document)
        .finish();
    Server::new(stdin, stdout, socket).serve(service).await;
}
