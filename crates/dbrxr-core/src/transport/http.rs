// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Blocking HTTP transport for the command execution API.

use std::sync::RwLock;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{Transport, TransportResult};
use crate::config::ClusterEndpoint;
use crate::error::TransportError;
use crate::types::{CommandStatus, ContextStatus, Language};
use crate::wire::{
    CommandExecuteRequest, CommandStatusResponse, ContextCreateRequest, ContextRequest,
    ContextStatusResponse, IdResponse,
};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Talks to `{api_base_url}/contexts/*` and `{api_base_url}/commands/*`
/// with a bearer token.
pub struct HttpTransport {
    agent: ureq::Agent,
    base_url: String,
    token: RwLock<String>,
}

impl HttpTransport {
    /// Create a transport for the endpoint's base URL and token.
    pub fn new(endpoint: &ClusterEndpoint) -> Self {
        Self::with_timeout(endpoint, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a transport with a custom per-request timeout.
    pub fn with_timeout(endpoint: &ClusterEndpoint, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: endpoint.api_base_url().to_string(),
            token: RwLock::new(endpoint.auth_token().to_string()),
        }
    }

    /// Replace the bearer token used for subsequent calls.
    pub fn set_auth_token(&self, token: impl Into<String>) {
        match self.token.write() {
            Ok(mut guard) => *guard = token.into(),
            Err(poisoned) => *poisoned.into_inner() = token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorization(&self) -> String {
        let token = match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        format!("Bearer {}", token)
    }

    fn url(&self, path: &str) -> TransportResult<String> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(TransportError::InvalidEndpoint(format!(
                "{}/{}",
                self.base_url, path
            )));
        }
        Ok(format!("{}/{}", self.base_url, path))
    }

    fn post<TRequest: Serialize + std::fmt::Debug, TResponse: DeserializeOwned>(
        &self,
        path: &str,
        body: &TRequest,
    ) -> TransportResult<TResponse> {
        let url = self.url(path)?;
        debug!(%url, ?body, "POST");

        let result = self
            .agent
            .post(&url)
            .set("Authorization", &self.authorization())
            .set("Content-Type", "application/json")
            .send_json(body);

        read_json(result)
    }

    fn get<TResponse: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> TransportResult<TResponse> {
        let url = self.url(path)?;
        debug!(%url, ?query, "GET");

        let mut request = self
            .agent
            .get(&url)
            .set("Authorization", &self.authorization());
        for (key, value) in query {
            request = request.query(key, value);
        }

        read_json(request.call())
    }
}

/// Turn a ureq outcome into parsed JSON or a [`TransportError`].
fn read_json<T: DeserializeOwned>(
    result: std::result::Result<ureq::Response, ureq::Error>,
) -> TransportResult<T> {
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }
        Err(ureq::Error::Transport(error)) => {
            return Err(TransportError::Request(error.to_string()));
        }
    };

    let status = response.status();
    let body = response
        .into_string()
        .map_err(|e| TransportError::Request(e.to_string()))?;

    serde_json::from_str(&body).map_err(|e| TransportError::Decode {
        status,
        body,
        message: e.to_string(),
    })
}

impl Transport for HttpTransport {
    fn create_context(
        &self,
        cluster_id: &str,
        language: Language,
        name: &str,
    ) -> TransportResult<String> {
        let request = ContextCreateRequest {
            language: language.as_str(),
            cluster_id,
            name,
        };
        let response: IdResponse = self.post("contexts/create", &request)?;
        Ok(response.id)
    }

    fn context_status(&self, cluster_id: &str, context_id: &str) -> TransportResult<ContextStatus> {
        let response: ContextStatusResponse = self.get(
            "contexts/status",
            &[("clusterId", cluster_id), ("contextId", context_id)],
        )?;
        Ok(response.into())
    }

    fn destroy_context(&self, cluster_id: &str, context_id: &str) -> TransportResult<()> {
        let request = ContextRequest {
            cluster_id,
            context_id,
        };
        // The body echoes the id; nothing in it is needed.
        let _: serde_json::Value = self.post("contexts/destroy", &request)?;
        Ok(())
    }

    fn submit(
        &self,
        cluster_id: &str,
        context_id: &str,
        language: Language,
        code: &str,
    ) -> TransportResult<String> {
        let request = CommandExecuteRequest {
            language: language.as_str(),
            cluster_id,
            context_id,
            command: code,
        };
        let response: IdResponse = self.post("commands/execute", &request)?;
        Ok(response.id)
    }

    fn poll_status(
        &self,
        cluster_id: &str,
        context_id: &str,
        command_id: &str,
    ) -> TransportResult<CommandStatus> {
        let response: CommandStatusResponse = self.get(
            "commands/status",
            &[
                ("clusterId", cluster_id),
                ("contextId", context_id),
                ("commandId", command_id),
            ],
        )?;
        Ok(response.into())
    }
}
