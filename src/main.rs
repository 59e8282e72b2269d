use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vibe::{
    AppState, Services,
    backend::SupabaseClient,
    config::Config,
    discovery::location::source_from_config,
    realtime::RealtimeClient,
    router::create_router,
    session::Session,
};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 会话：没有令牌时以访客身份运行
    let session = Session::from_config(&config).expect("Invalid session token");
    match &session {
        Some(s) => tracing::info!("Signed in as {}", s.user_id),
        None => tracing::warn!("No VIBE_ACCESS_TOKEN set, protected routes will answer 401"),
    }

    // 后端客户端只创建一次
    let backend = Arc::new(SupabaseClient::new(&config));
    let realtime = RealtimeClient::new(
        backend.base_url(),
        backend.anon_key(),
        backend.access_token(),
    );

    let services = Services {
        discovery: backend.clone(),
        social: backend,
        feed: Arc::new(realtime.clone()),
        location: source_from_config(&config),
        realtime: Some(realtime),
    };

    let state = AppState::new(config, services, session);
    let app = create_router(state.clone());

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app,
    )
    .await
    .expect("Failed to start server");
}
