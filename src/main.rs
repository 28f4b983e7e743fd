use tower_lsp::Server;
use tracing_subscriber::EnvFilter;
use uibeam_lsp::create_service;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // stdout carries the LSP stream.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_env("UIBEAM_LSP_LOG")
                .unwrap_or_else(|_| EnvFilter::new("uibeam_lsp=info")),
        )
        .init();

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = create_service();
    Server::new(stdin, stdout, socket).serve(service).await;
}
