use std::{collections::HashMap, net::SocketAddr};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{header, Client, Method, Url};
use serde::{Deserialize, Serialize};

use crate::{MonofleetError, MonofleetResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An HTTP request relayed to a machine workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkloadRequest {
    /// The request method. Empty means `GET`.
    pub http_method: String,

    /// The request path.
    pub raw_path: String,

    /// The query string, without the leading `?`.
    pub raw_query_string: String,

    /// Single-valued headers.
    pub headers: HashMap<String, String>,

    /// Multi-valued headers.
    pub multi_value_headers: HashMap<String, Vec<String>>,

    /// Values of `Cookie` headers.
    pub cookies: Vec<String>,

    /// The request body.
    pub body: String,

    /// Whether `body` is base64-encoded.
    pub is_base64_encoded: bool,
}

/// The response of a machine workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkloadResponse {
    /// The response status.
    pub status_code: u16,

    /// Headers that appeared once.
    pub headers: HashMap<String, String>,

    /// Headers that appeared more than once.
    pub multi_value_headers: HashMap<String, Vec<String>>,

    /// Values of `Set-Cookie` headers.
    pub cookies: Vec<String>,

    /// The response body.
    pub body: String,

    /// Whether `body` is base64-encoded. Always true for responses relayed by the fleet.
    pub is_base64_encoded: bool,
}

/// Sends a relayed request to the workload of one machine.
#[async_trait]
pub trait WorkloadClient: Send + Sync + 'static {
    /// Sends `request` to the workload listening at `address`.
    async fn invoke(
        &self,
        address: SocketAddr,
        request: WorkloadRequest,
    ) -> MonofleetResult<WorkloadResponse>;
}

/// Relays requests over plain HTTP.
#[derive(Debug, Clone)]
pub struct HttpWorkloadClient {
    client: Client,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl HttpWorkloadClient {
    /// Creates a new client.
    pub fn new() -> MonofleetResult<Self> {
        let client = Client::builder().no_proxy().build()?;
        Ok(Self { client })
    }
}

impl WorkloadRequest {
    /// The decoded request body.
    pub fn decoded_body(&self) -> MonofleetResult<Vec<u8>> {
        if self.is_base64_encoded && !self.body.is_empty() {
            Ok(STANDARD.decode(&self.body)?)
        } else {
            Ok(self.body.clone().into_bytes())
        }
    }

    fn method(&self) -> MonofleetResult<Method> {
        if self.http_method.is_empty() {
            return Ok(Method::GET);
        }

        Method::from_bytes(self.http_method.as_bytes())
            .map_err(|_| MonofleetError::InvalidHttpMethod(self.http_method.clone()))
    }

    fn url(&self, address: SocketAddr) -> MonofleetResult<Url> {
        let mut url = Url::parse(&format!("http://{address}"))
            .map_err(|e| MonofleetError::InvalidUrl(format!("{address}: {e}")))?;
        url.set_path(&self.raw_path);
        if !self.raw_query_string.is_empty() {
            url.set_query(Some(&self.raw_query_string));
        }

        Ok(url)
    }
}

impl WorkloadResponse {
    /// The decoded response body.
    pub fn decoded_body(&self) -> MonofleetResult<Vec<u8>> {
        if self.is_base64_encoded {
            Ok(STANDARD.decode(&self.body)?)
        } else {
            Ok(self.body.clone().into_bytes())
        }
    }

    async fn from_reqwest(response: reqwest::Response) -> MonofleetResult<Self> {
        let status_code = response.status().as_u16();

        let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
        let mut cookies = Vec::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            if name == header::SET_COOKIE {
                cookies.push(value.clone());
            }
            grouped.entry(name.to_string()).or_default().push(value);
        }

        let mut headers = HashMap::new();
        let mut multi_value_headers = HashMap::new();
        for (name, mut values) in grouped {
            if values.len() == 1 {
                headers.insert(name, values.remove(0));
            } else {
                multi_value_headers.insert(name, values);
            }
        }

        let body = STANDARD.encode(response.bytes().await?);

        Ok(Self {
            status_code,
            headers,
            multi_value_headers,
            cookies,
            body,
            is_base64_encoded: true,
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl WorkloadClient for HttpWorkloadClient {
    async fn invoke(
        &self,
        address: SocketAddr,
        request: WorkloadRequest,
    ) -> MonofleetResult<WorkloadResponse> {
        let url = request.url(address)?;
        let method = request.method()?;
        tracing::debug!(method = %method, url = %url, "relaying workload request");

        let mut builder = self
            .client
            .request(method, url)
            .body(request.decoded_body()?);

        for cookie in &request.cookies {
            builder = builder.header(header::COOKIE, cookie.as_str());
        }

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        for (name, values) in &request.multi_value_headers {
            for value in values {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }

        let response = builder.send().await?;
        WorkloadResponse::from_reqwest(response).await
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
