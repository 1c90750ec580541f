//! Command-line commands
//!
//! Every command prints one JSON document on success.

use anyhow::{Context, Result, bail};
use api_client::ApiClient;
use common::Secret;
use serde_json::{Value, json};

pub const USAGE: &str = "\
usage: session-cli [--config <path>] <command>

commands:
  login <email>          sign in (password from API_PASSWORD)
  logout                 forget the stored session
  verify                 check the stored access token
  whoami                 show the claims of the stored access token
  get <path>             GET an API path
  post <path> <json>     POST a JSON body to an API path
  register <json>        create an account";

#[derive(Debug, PartialEq)]
pub enum Command {
    Login { email: String },
    Logout,
    Verify,
    Whoami,
    Get { path: String },
    Post { path: String, body: Value },
    Register { body: Value },
}

/// Split `--config <path>` from the command words.
pub fn split_args(args: &[String]) -> (Option<String>, Vec<String>) {
    let mut config = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            config = iter.next().cloned();
        } else {
            rest.push(arg.clone());
        }
    }
    (config, rest)
}

impl Command {
    pub fn parse(words: &[String]) -> Result<Self> {
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        let command = match words.as_slice() {
            ["login", email] => Command::Login {
                email: email.to_string(),
            },
            ["logout"] => Command::Logout,
            ["verify"] => Command::Verify,
            ["whoami"] => Command::Whoami,
            ["get", path] => Command::Get {
                path: path.to_string(),
            },
            ["post", path, body] => Command::Post {
                path: path.to_string(),
                body: parse_body(body)?,
            },
            ["register", body] => Command::Register {
                body: parse_body(body)?,
            },
            [] => bail!("missing command\n\n{USAGE}"),
            other => bail!("unrecognised command: {}\n\n{USAGE}", other.join(" ")),
        };
        Ok(command)
    }

    /// Run against `client`. `password` is only needed for `login`.
    pub async fn run(self, client: &ApiClient, password: Option<&Secret<String>>) -> Result<Value> {
        let output = match self {
            Command::Login { email } => {
                let password = password.context("API_PASSWORD must be set to log in")?;
                let user = client.login(&email, password).await?;
                json!({ "logged_in": email, "user": user })
            }
            Command::Logout => {
                client.logout().await;
                json!({ "logged_out": true })
            }
            Command::Verify => json!({ "valid": client.verify().await? }),
            Command::Whoami => match client.claims().await? {
                Some(claims) => serde_json::to_value(claims)?,
                None => json!({ "authenticated": false }),
            },
            Command::Get { path } => client.get_json(&path).await?,
            Command::Post { path, body } => client.post_json(&path, body).await?,
            Command::Register { body } => client.register(body).await?,
        };
        Ok(output)
    }
}

fn parse_body(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("request body is not valid JSON: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::{ClientConfig, ErrorKind};
    use axum::Json;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use session_auth::{CredentialPair, FileSessionStore, SessionStore};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    fn words(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn split_args_extracts_config() {
        let (config, rest) = split_args(&words("--config /etc/cli.toml get /employees/"));
        assert_eq!(config.as_deref(), Some("/etc/cli.toml"));
        assert_eq!(rest, words("get /employees/"));
    }

    #[test]
    fn parse_known_commands() {
        assert_eq!(
            Command::parse(&words("login ana@example.com")).unwrap(),
            Command::Login {
                email: "ana@example.com".into()
            }
        );
        assert_eq!(Command::parse(&words("logout")).unwrap(), Command::Logout);
        assert_eq!(
            Command::parse(&words("post /employees/ {\"rfc\":\"X\"}")).unwrap(),
            Command::Post {
                path: "/employees/".into(),
                body: json!({"rfc": "X"})
            }
        );
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(Command::parse(&[]).is_err());
        assert!(Command::parse(&words("launch")).is_err());
        assert!(Command::parse(&words("register {not-json")).is_err());
    }

    async fn employees(headers: HeaderMap) -> Response {
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some("Bearer at_login") => Json(json!([{"id": 1}])).into_response(),
            _ => (StatusCode::UNAUTHORIZED, Json(json!({"detail": "expired"}))).into_response(),
        }
    }

    async fn token() -> Response {
        Json(json!({"access": "at_login", "refresh": "rt_login"})).into_response()
    }

    async fn refresh() -> Response {
        (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Token is blacklisted"}))).into_response()
    }

    async fn start_api() -> String {
        let api = Router::new()
            .route("/auth/token/", post(token))
            .route("/auth/token/refresh/", post(refresh))
            .route("/employees/", get(employees));
        let app = Router::new().nest("/api", api);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    async fn open_client(base_url: String, session: &std::path::Path) -> (ApiClient, Arc<FileSessionStore>) {
        let store = Arc::new(FileSessionStore::load(session.to_path_buf()).await.unwrap());
        let config = ClientConfig {
            base_url,
            ..Default::default()
        };
        (ApiClient::new(config, store.clone()).unwrap(), store)
    }

    #[tokio::test]
    async fn login_persists_session_for_later_runs() {
        let base_url = start_api().await;
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("session.json");

        let (client, _) = open_client(base_url.clone(), &session).await;
        let password = Secret::new("secret".to_string());
        let out = Command::parse(&words("login ana@example.com"))
            .unwrap()
            .run(&client, Some(&password))
            .await
            .unwrap();
        assert_eq!(out["logged_in"], "ana@example.com");

        // A fresh process picks up the stored pair
        let (client, store) = open_client(base_url, &session).await;
        assert_eq!(
            store.get().await.unwrap(),
            CredentialPair::new("at_login", "rt_login")
        );
        let out = Command::Get {
            path: "/employees/".into(),
        }
        .run(&client, None)
        .await
        .unwrap();
        assert_eq!(out[0]["id"], 1);
    }

    #[tokio::test]
    async fn login_without_password_fails_before_request() {
        let base_url = start_api().await;
        let dir = tempfile::tempdir().unwrap();
        let (client, store) = open_client(base_url, &dir.path().join("session.json")).await;

        let err = Command::Login {
            email: "ana@example.com".into(),
        }
        .run(&client, None)
        .await
        .unwrap_err();
        assert!(err.to_string().contains("API_PASSWORD"));
        assert!(store.get().await.is_none());
    }

    #[tokio::test]
    async fn expired_session_reports_reauthentication() {
        let base_url = start_api().await;
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("session.json");
        std::fs::write(&session, r#"{"access":"at_old","refresh":"rt_old"}"#).unwrap();

        let (client, _) = open_client(base_url, &session).await;
        let mut events = client.subscribe();
        let err = Command::Get {
            path: "/employees/".into(),
        }
        .run(&client, None)
        .await
        .unwrap_err();

        let api_err = err.downcast_ref::<api_client::ApiError>().unwrap();
        assert_eq!(api_err.kind, ErrorKind::SessionInvalid);
        assert!(events.recv().await.is_ok());
        assert!(!session.exists());
    }

    #[tokio::test]
    async fn whoami_without_session() {
        let base_url = start_api().await;
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = open_client(base_url, &dir.path().join("session.json")).await;

        let out = Command::Whoami.run(&client, None).await.unwrap();
        assert_eq!(out, json!({"authenticated": false}));
    }
}
