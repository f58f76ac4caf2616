#[tokio::main]
async fn main() -> ontology_store::Result<()> {
    ontology_store::cli::main().await
}
