use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::{reply, Filter, Rejection, Reply};

use crate::transport::{tokenize, Channel, TransportEvent, TransportHandle};

#[derive(Debug, Deserialize, Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T, message: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: message.to_string(),
        }
    }
}

impl ApiResponse<()> {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message,
        }
    }
}

/// Either pre-split tokens or a single command line.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub tokens: Option<Vec<String>>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default = "default_channel")]
    pub channel: Channel,
}

fn default_channel() -> Channel {
    Channel::Media
}

impl CommandRequest {
    pub fn into_event(self) -> Result<TransportEvent, String> {
        let tokens = match (self.tokens, self.command) {
            (Some(tokens), None) => tokens,
            (None, Some(command)) => tokenize(&command),
            (Some(_), Some(_)) => return Err("send either tokens or command, not both".to_string()),
            (None, None) => return Err("missing tokens or command".to_string()),
        };
        Ok(TransportEvent::command(self.channel, "http", tokens))
    }
}

pub fn routes(
    transport: TransportHandle,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| reply::json(&ApiResponse::success("healthy", "Kiosk player is running")));

    let version = warp::path("version")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            let version_info = serde_json::json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            });
            reply::json(&ApiResponse::success(version_info, "Version information"))
        });

    let status_transport = transport.clone();
    let status = warp::path("status")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || {
            let status = serde_json::json!({
                "player": status_transport.current_status(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            });
            reply::json(&ApiResponse::success(status, "Status retrieved"))
        });

    let command_transport = transport.clone();
    let command = warp::path("command")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json::<CommandRequest>())
        .and_then(move |req: CommandRequest| {
            let transport = command_transport.clone();
            async move { Ok::<_, Infallible>(forward(&transport, req.into_event()).await) }
        });

    let disconnect_transport = transport;
    let disconnect = warp::path!("admin" / "disconnect")
        .and(warp::post())
        .and_then(move || {
            let transport = disconnect_transport.clone();
            async move {
                Ok::<_, Infallible>(forward(&transport, Ok(TransportEvent::AdminDisconnected)).await)
            }
        });

    warp::path("api")
        .and(health.or(version).or(status).or(command).or(disconnect))
        .with(
            warp::cors()
                .allow_any_origin()
                .allow_headers(vec!["content-type"])
                .allow_methods(vec!["GET", "POST"]),
        )
}

/// Queues the event for the player. The reply only says the command was
/// accepted for delivery; parse errors show up on the error feed.
async fn forward(
    transport: &TransportHandle,
    event: Result<TransportEvent, String>,
) -> reply::WithStatus<reply::Json> {
    let event = match event {
        Ok(event) => event,
        Err(message) => {
            return reply::with_status(
                reply::json(&ApiResponse::failure(message)),
                StatusCode::BAD_REQUEST,
            )
        }
    };

    match transport.send(event).await {
        Ok(()) => reply::with_status(
            reply::json(&ApiResponse::success((), "Command queued")),
            StatusCode::ACCEPTED,
        ),
        Err(e) => reply::with_status(
            reply::json(&ApiResponse::failure(e.to_string())),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
    }
}

pub async fn run_http_server(port: u16, transport: TransportHandle) {
    tracing::info!(port, "starting HTTP server");
    warp::serve(routes(transport)).run(([0, 0, 0, 0], port)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ActiveMedia, PlayerStatus};
    use crate::transport::link;

    fn idle() -> PlayerStatus {
        PlayerStatus {
            state: ActiveMedia::Idle,
            media: None,
            position: None,
            volume: 1.0,
            seeking: false,
        }
    }

    #[tokio::test]
    async fn health_and_status() {
        let (handle, _link) = link(4, idle());
        let api = routes(handle);

        let res = warp::test::request().path("/api/health").reply(&api).await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = warp::test::request().path("/api/status").reply(&api).await;
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["data"]["player"]["state"], "idle");
    }

    #[tokio::test]
    async fn command_line_is_tokenized_and_queued() {
        let (handle, mut link) = link(4, idle());
        let api = routes(handle);

        let res = warp::test::request()
            .method("POST")
            .path("/api/command")
            .json(&serde_json::json!({ "command": "volume set 0.4", "channel": "system" }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(
            link.events.recv().await,
            Some(TransportEvent::System {
                session: "http".to_string(),
                tokens: vec!["volume".to_string(), "set".to_string(), "0.4".to_string()],
            })
        );

        let res = warp::test::request()
            .method("POST")
            .path("/api/command")
            .json(&serde_json::json!({ "tokens": ["play", "7"] }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert!(matches!(
            link.events.recv().await,
            Some(TransportEvent::Media { tokens, .. }) if tokens == ["play", "7"]
        ));
    }

    #[tokio::test]
    async fn command_without_tokens_is_rejected() {
        let (handle, _link) = link(4, idle());
        let res = warp::test::request()
            .method("POST")
            .path("/api/command")
            .json(&serde_json::json!({ "channel": "media" }))
            .reply(&routes(handle))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_disconnect_is_forwarded() {
        let (handle, mut link) = link(4, idle());
        let res = warp::test::request()
            .method("POST")
            .path("/api/admin/disconnect")
            .reply(&routes(handle))
            .await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(link.events.recv().await, Some(TransportEvent::AdminDisconnected));
    }
}
