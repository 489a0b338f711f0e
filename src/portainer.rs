//! Portainer REST API: wire types, the `PortainerApi` seam used by the
//! orchestrator, and the blocking `reqwest` implementation behind it.

use crate::config::Credentials;
use crate::env::EnvironmentOverride;
use crate::error::{DeployError, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Bearer token for one invocation. Never logged or persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(jwt: impl Into<String>) -> Self {
        Self(jwt.into())
    }

    fn bearer(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Stack {
    #[serde(rename = "Id")]
    pub id: u64,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "EndpointId")]
    pub endpoint_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "Id")]
    pub id: u64,
}

#[derive(Debug, Deserialize)]
struct SwarmInfo {
    #[serde(rename = "Cluster")]
    cluster: SwarmCluster,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SwarmCluster {
    #[serde(rename = "ID")]
    pub id: String,
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    jwt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateStackRequest {
    pub env: Vec<EnvironmentOverride>,
    pub name: String,
    #[serde(rename = "stackFileContent")]
    pub stack_file_content: String,
    #[serde(rename = "swarmID")]
    pub swarm_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateStackRequest {
    pub env: Vec<EnvironmentOverride>,
    /// Always false: orphaned services are never removed by this tool.
    pub prune: bool,
    #[serde(rename = "stackFileContent")]
    pub stack_file_content: String,
}

pub trait PortainerApi {
    fn authenticate(&self, credentials: &Credentials) -> Result<AuthToken>;
    fn list_stacks(&self, token: &AuthToken) -> Result<Vec<Stack>>;
    fn list_endpoints(&self, token: &AuthToken) -> Result<Vec<Endpoint>>;
    fn swarm_cluster(&self, token: &AuthToken, endpoint_id: u64) -> Result<SwarmCluster>;
    fn create_stack(
        &self,
        token: &AuthToken,
        endpoint_id: u64,
        request: &CreateStackRequest,
    ) -> Result<()>;
    fn update_stack(
        &self,
        token: &AuthToken,
        stack_id: u64,
        endpoint_id: u64,
        request: &UpdateStackRequest,
    ) -> Result<()>;
}

pub struct HttpPortainer {
    client: Client,
    api_url: Url,
}

impl HttpPortainer {
    pub fn new(api_url: Url, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, api_url })
    }

    /// Builds `<api_url>/<segments...>`, percent-encoding each segment.
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn send(&self, url: &Url, request: RequestBuilder) -> Result<Response> {
        let response = request.send().map_err(|source| DeployError::Transport {
            url: url.to_string(),
            source,
        })?;
        debug!(%url, status = response.status().as_u16(), "portainer response");
        Ok(response)
    }

    fn get<T: DeserializeOwned>(
        &self,
        token: &AuthToken,
        segments: &[&str],
        resource: &'static str,
    ) -> Result<T> {
        let url = self.url(segments);
        debug!(%url, "GET");
        let response = self.send(&url, self.client.get(url.clone()).bearer_auth(token.bearer()))?;
        if !response.status().is_success() {
            return Err(DeployError::Lookup {
                resource,
                status: response.status().as_u16(),
            });
        }
        decode(&url, response)
    }

    fn mutate<B: Serialize>(
        &self,
        url: Url,
        request: RequestBuilder,
        body: &B,
        action: &'static str,
    ) -> Result<()> {
        let response = self.send(&url, request.json(body))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(DeployError::Mutation {
            action,
            status: status.as_u16(),
            body: mutation_body(response.text()),
        })
    }
}

impl PortainerApi for HttpPortainer {
    fn authenticate(&self, credentials: &Credentials) -> Result<AuthToken> {
        let url = self.url(&["auth"]);
        debug!(%url, username = %credentials.username, "POST");
        let request = self.client.post(url.clone()).json(&AuthRequest {
            username: &credentials.username,
            password: &credentials.password,
        });
        let response = self.send(&url, request)?;
        if !response.status().is_success() {
            return Err(DeployError::Authentication {
                status: response.status().as_u16(),
            });
        }
        let auth: AuthResponse = decode(&url, response)?;
        Ok(AuthToken::new(auth.jwt))
    }

    fn list_stacks(&self, token: &AuthToken) -> Result<Vec<Stack>> {
        self.get(token, &["stacks"], "list of Portainer stacks")
    }

    fn list_endpoints(&self, token: &AuthToken) -> Result<Vec<Endpoint>> {
        self.get(token, &["endpoints"], "list of Portainer endpoints")
    }

    fn swarm_cluster(&self, token: &AuthToken, endpoint_id: u64) -> Result<SwarmCluster> {
        let id = endpoint_id.to_string();
        let info: SwarmInfo = self.get(
            token,
            &["endpoints", &id, "docker", "swarm"],
            "Swarm cluster ID",
        )?;
        Ok(info.cluster)
    }

    fn create_stack(
        &self,
        token: &AuthToken,
        endpoint_id: u64,
        request: &CreateStackRequest,
    ) -> Result<()> {
        let url = self.url(&["stacks"]);
        debug!(%url, endpoint_id, name = %request.name, "POST");
        let builder = self
            .client
            .post(url.clone())
            .bearer_auth(token.bearer())
            .query(&[
                ("type", "1".to_string()),
                ("method", "string".to_string()),
                ("endpointId", endpoint_id.to_string()),
            ]);
        self.mutate(url, builder, request, "Stack creation")
    }

    fn update_stack(
        &self,
        token: &AuthToken,
        stack_id: u64,
        endpoint_id: u64,
        request: &UpdateStackRequest,
    ) -> Result<()> {
        let url = self.url(&["stacks", &stack_id.to_string()]);
        debug!(%url, endpoint_id, "PUT");
        let builder = self
            .client
            .put(url.clone())
            .bearer_auth(token.bearer())
            .query(&[("endpointId", endpoint_id)]);
        self.mutate(url, builder, request, "Stack update")
    }
}

/// The `Decode` reason carries serde's message, including any missing field.
fn decode<T: DeserializeOwned>(url: &Url, response: Response) -> Result<T> {
    let body = response.bytes().map_err(|source| DeployError::Transport {
        url: url.to_string(),
        source,
    })?;
    serde_json::from_slice(&body).map_err(|e| DeployError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

fn mutation_body<E: std::fmt::Display>(text: std::result::Result<String, E>) -> String {
    match text {
        Ok(body) => pretty_body(&body),
        Err(e) => format!("<failed to read response body: {}>", e),
    }
}

/// Portainer reports validation errors as JSON; indent them for the operator.
fn pretty_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> HttpPortainer {
        let api_url = crate::config::api_url("https://portainer.local:9443").unwrap();
        HttpPortainer::new(api_url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn builds_nested_urls() {
        let api = client();
        assert_eq!(
            api.url(&["endpoints", "3", "docker", "swarm"]).as_str(),
            "https://portainer.local:9443/api/endpoints/3/docker/swarm"
        );
        assert_eq!(api.url(&["auth"]).as_str(), "https://portainer.local:9443/api/auth");
    }

    #[test]
    fn decodes_stack_listing() {
        let stacks: Vec<Stack> = serde_json::from_value(json!([
            {"Id": 7, "Name": "web", "EndpointId": 3, "Type": 1, "Status": 1},
            {"Id": 9, "Name": "db", "EndpointId": 3}
        ]))
        .unwrap();
        assert_eq!(
            stacks[0],
            Stack {
                id: 7,
                name: "web".into(),
                endpoint_id: 3
            }
        );
        assert_eq!(stacks.len(), 2);
    }

    #[test]
    fn decodes_swarm_cluster_id() {
        let info: SwarmInfo = serde_json::from_value(json!({
            "Cluster": {"ID": "x9k2m", "Version": {"Index": 10}},
            "NodeID": "abc"
        }))
        .unwrap();
        assert_eq!(info.cluster.id, "x9k2m");
    }

    #[test]
    fn create_body_uses_portainer_field_names() {
        let body = serde_json::to_value(CreateStackRequest {
            env: vec![EnvironmentOverride {
                name: "TAG".into(),
                value: "v2".into(),
            }],
            name: "web".into(),
            stack_file_content: "services: {}\n".into(),
            swarm_id: "x9k2m".into(),
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "env": [{"name": "TAG", "value": "v2"}],
                "name": "web",
                "stackFileContent": "services: {}\n",
                "swarmID": "x9k2m"
            })
        );
    }

    #[test]
    fn update_body_carries_prune_flag() {
        let body = serde_json::to_value(UpdateStackRequest {
            env: vec![],
            prune: false,
            stack_file_content: "services: {}\n".into(),
        })
        .unwrap();
        assert_eq!(
            body,
            json!({"env": [], "prune": false, "stackFileContent": "services: {}\n"})
        );
    }

    #[test]
    fn error_bodies_are_indented_when_json() {
        assert_eq!(
            pretty_body(r#"{"message":"Invalid stack file"}"#),
            "{\n  \"message\": \"Invalid stack file\"\n}"
        );
        assert_eq!(pretty_body("502 Bad Gateway"), "502 Bad Gateway");
    }

    #[test]
    fn unreadable_error_body_is_reported() {
        assert_eq!(
            mutation_body::<&str>(Err("connection reset by peer")),
            "<failed to read response body: connection reset by peer>"
        );
        assert_eq!(mutation_body::<&str>(Ok("[]".into())), "[]");
    }

    #[test]
    fn token_is_not_printed() {
        assert_eq!(format!("{:?}", AuthToken::new("eyJhbGci")), "AuthToken(<redacted>)");
    }

    mod http {
        use super::*;
        use serde_json::json;
        use tokio::runtime::Runtime;
        use wiremock::matchers::{body_json, header, method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        /// A wiremock server driven from the blocking client. The runtime only
        /// starts the server and mounts mocks; requests are sent from the test
        /// thread.
        struct Server {
            mock: MockServer,
            rt: Runtime,
        }

        impl Server {
            fn start() -> Self {
                let rt = Runtime::new().unwrap();
                let mock = rt.block_on(MockServer::start());
                Self { mock, rt }
            }

            fn mount(&self, mock: Mock) {
                self.rt.block_on(mock.mount(&self.mock));
            }

            fn api(&self) -> HttpPortainer {
                let api_url = crate::config::api_url(&self.mock.uri()).unwrap();
                HttpPortainer::new(api_url, Duration::from_secs(5)).unwrap()
            }
        }

        fn token() -> AuthToken {
            AuthToken::new("tok")
        }

        fn credentials() -> Credentials {
            Credentials {
                username: "admin".into(),
                password: "secret".into(),
            }
        }

        #[test]
        fn login_posts_credentials_and_returns_jwt() {
            let server = Server::start();
            server.mount(
                Mock::given(method("POST"))
                    .and(path("/api/auth"))
                    .and(body_json(json!({"username": "admin", "password": "secret"})))
                    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jwt": "tok"}))),
            );

            let token = server.api().authenticate(&credentials()).unwrap();
            assert_eq!(token, AuthToken::new("tok"));
        }

        #[test]
        fn rejected_login_is_an_authentication_error() {
            let server = Server::start();
            server.mount(
                Mock::given(method("POST"))
                    .and(path("/api/auth"))
                    .respond_with(ResponseTemplate::new(401)),
            );

            let err = server.api().authenticate(&credentials()).unwrap_err();
            assert!(matches!(err, DeployError::Authentication { status: 401 }));
        }

        #[test]
        fn stack_listing_sends_bearer_token() {
            let server = Server::start();
            server.mount(
                Mock::given(method("GET"))
                    .and(path("/api/stacks"))
                    .and(header("authorization", "Bearer tok"))
                    .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                        {"Id": 7, "Name": "web", "EndpointId": 3}
                    ]))),
            );

            let stacks = server.api().list_stacks(&token()).unwrap();
            assert_eq!(
                stacks,
                vec![Stack {
                    id: 7,
                    name: "web".into(),
                    endpoint_id: 3
                }]
            );
        }

        #[test]
        fn failed_lookup_is_a_lookup_error() {
            let server = Server::start();
            server.mount(
                Mock::given(method("GET"))
                    .and(path("/api/endpoints"))
                    .respond_with(ResponseTemplate::new(500)),
            );

            let err = server.api().list_endpoints(&token()).unwrap_err();
            assert!(matches!(
                err,
                DeployError::Lookup {
                    resource: "list of Portainer endpoints",
                    status: 500
                }
            ));
        }

        #[test]
        fn swarm_cluster_is_read_from_endpoint_docker_proxy() {
            let server = Server::start();
            server.mount(
                Mock::given(method("GET"))
                    .and(path("/api/endpoints/3/docker/swarm"))
                    .and(header("authorization", "Bearer tok"))
                    .respond_with(
                        ResponseTemplate::new(200)
                            .set_body_json(json!({"Cluster": {"ID": "x9k2m"}, "NodeID": "n1"})),
                    ),
            );

            let cluster = server.api().swarm_cluster(&token(), 3).unwrap();
            assert_eq!(cluster.id, "x9k2m");
        }

        #[test]
        fn non_swarm_endpoint_names_missing_field() {
            let server = Server::start();
            server.mount(
                Mock::given(method("GET"))
                    .and(path("/api/endpoints/3/docker/swarm"))
                    .respond_with(
                        ResponseTemplate::new(200).set_body_json(json!({"message": "not a swarm"})),
                    ),
            );

            match server.api().swarm_cluster(&token(), 3).unwrap_err() {
                DeployError::Decode { url, reason } => {
                    assert!(url.ends_with("/api/endpoints/3/docker/swarm"));
                    assert!(reason.contains("Cluster"), "reason: {reason}");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn create_sends_query_and_body() {
            let server = Server::start();
            server.mount(
                Mock::given(method("POST"))
                    .and(path("/api/stacks"))
                    .and(query_param("type", "1"))
                    .and(query_param("method", "string"))
                    .and(query_param("endpointId", "4"))
                    .and(header("authorization", "Bearer tok"))
                    .and(body_json(json!({
                        "env": [],
                        "name": "web",
                        "stackFileContent": "x",
                        "swarmID": "s"
                    })))
                    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Id": 12}))),
            );

            let request = CreateStackRequest {
                env: vec![],
                name: "web".into(),
                stack_file_content: "x".into(),
                swarm_id: "s".into(),
            };
            server.api().create_stack(&token(), 4, &request).unwrap();
        }

        #[test]
        fn update_sends_query_and_body_without_prune() {
            let server = Server::start();
            server.mount(
                Mock::given(method("PUT"))
                    .and(path("/api/stacks/7"))
                    .and(query_param("endpointId", "3"))
                    .and(header("authorization", "Bearer tok"))
                    .and(body_json(json!({
                        "env": [{"name": "TAG", "value": "v2"}],
                        "prune": false,
                        "stackFileContent": "x"
                    })))
                    .respond_with(ResponseTemplate::new(200)),
            );

            let request = UpdateStackRequest {
                env: vec![EnvironmentOverride {
                    name: "TAG".into(),
                    value: "v2".into(),
                }],
                prune: false,
                stack_file_content: "x".into(),
            };
            server.api().update_stack(&token(), 7, 3, &request).unwrap();
        }

        #[test]
        fn rejected_create_returns_indented_body() {
            let server = Server::start();
            server.mount(
                Mock::given(method("POST"))
                    .and(path("/api/stacks"))
                    .respond_with(
                        ResponseTemplate::new(400).set_body_json(json!({"message": "bad"})),
                    ),
            );

            let request = CreateStackRequest {
                env: vec![],
                name: "web".into(),
                stack_file_content: "x".into(),
                swarm_id: "s".into(),
            };
            match server.api().create_stack(&token(), 4, &request).unwrap_err() {
                DeployError::Mutation {
                    action,
                    status,
                    body,
                } => {
                    assert_eq!(action, "Stack creation");
                    assert_eq!(status, 400);
                    assert_eq!(body, "{\n  \"message\": \"bad\"\n}");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }
}
