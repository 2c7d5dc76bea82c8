#[tokio::main]
async fn main() -> anyhow::Result<()> {
    devmesh_server::start_server().await
}
