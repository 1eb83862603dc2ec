use database::{DatabaseConnectionInfo, PgDatabase};
use transit::{
    client::Client,
    engine::{ClusteringEngine, EngineConfig},
};
use web::{security::AuthConfig, start_web_server, WebState};

#[tokio::main]
async fn main() {
    env_logger::init();

    // database
    let database_connection_info = DatabaseConnectionInfo::from_env()
        .expect("expected database connection info in env.");
    let database = PgDatabase::connect(database_connection_info)
        .await
        .expect("could not connect to database.");

    // auth
    let auth = AuthConfig::from_env().expect("expected AUTH_SECRET in env.");

    // clustering engine
    let engine = ClusteringEngine::start(database.clone(), EngineConfig::default());

    // web server
    let state = WebState {
        transit_client: Client::new(database),
        engine: engine.handle(),
        auth,
    };
    if let Err(why) = start_web_server(state).await {
        log::error!("web server exited with error: {why}");
    }

    engine.stop().await;
}
