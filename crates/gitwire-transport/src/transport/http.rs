//! Smart HTTP transport.
//!
//! Discovery is `GET <repo>/info/refs?service=<svc>`; each exchange is one
//! `POST <repo>/<svc>`. The transport is stateless: every request carries
//! the credentials again and a fetch session may run several fetches.

use crate::session::{
    decode_advertisement, read_upload_pack_response, FetchPackSession, SendPackSession, Session,
    State, UploadPackResponse,
};
use crate::transport::Transport;
use crate::{AuthMethod, Result, TransportConfig, TransportError};
use gitwire_protocol::{
    AdvRefs, Endpoint, PktLineReader, ReferenceUpdateRequest, ReportStatus, Service,
    UploadPackRequest,
};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use std::io::Cursor;

/// Opens smart HTTP sessions with a shared client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Uses an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client with the user agent and timeouts from `config`.
    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.io_timeout());
        if let Some(timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        Ok(Self::new(builder.build()?))
    }
}

impl Transport for HttpTransport {
    fn new_fetch_pack_session(
        &self,
        endpoint: &Endpoint,
        auth: Option<AuthMethod>,
    ) -> Result<Box<dyn FetchPackSession>> {
        Ok(Box::new(HttpFetchPackSession {
            session: HttpSession::new(self.client.clone(), Service::UploadPack, endpoint, auth),
            response: None,
        }))
    }

    fn new_send_pack_session(
        &self,
        endpoint: &Endpoint,
        auth: Option<AuthMethod>,
    ) -> Result<Box<dyn SendPackSession>> {
        Ok(Box::new(HttpSendPackSession {
            session: HttpSession::new(self.client.clone(), Service::ReceivePack, endpoint, auth),
        }))
    }
}

/// State shared by HTTP fetch and push sessions.
#[derive(Debug)]
struct HttpSession {
    client: Client,
    service: Service,
    endpoint: Endpoint,
    auth: Option<AuthMethod>,
    adv_refs: Option<AdvRefs>,
    state: State,
}

impl HttpSession {
    fn new(client: Client, service: Service, endpoint: &Endpoint, auth: Option<AuthMethod>) -> Self {
        let auth = auth.or_else(|| AuthMethod::from_endpoint(endpoint));
        if let Some(auth) = &auth {
            tracing::debug!(method = auth.name(), "using HTTP credentials");
        }
        Self {
            client,
            service,
            endpoint: endpoint.clone(),
            auth,
            adv_refs: None,
            state: State::Unadvertised,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == State::Closed {
            return Err(TransportError::SessionClosed);
        }
        Ok(())
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(auth) => auth.apply(request),
            None => request,
        }
    }

    fn info_refs_url(&self) -> String {
        format!(
            "{}/info/refs?service={}",
            self.endpoint.base_url(),
            self.service
        )
    }

    fn service_url(&self) -> String {
        format!("{}/{}", self.endpoint.base_url(), self.service)
    }

    fn advertised_references(&mut self) -> Result<&AdvRefs> {
        self.ensure_open()?;
        if self.adv_refs.is_none() {
            let url = self.info_refs_url();
            tracing::debug!(%url, "requesting reference advertisement");
            let response = self.with_auth(self.client.get(&url)).send()?;
            let body = check_status(response, &url)?.bytes()?;
            let mut reader = PktLineReader::new(Cursor::new(body));
            let adv = decode_advertisement(&mut reader, self.service, &self.endpoint)?;
            self.adv_refs = Some(adv);
            self.state = State::Advertised;
        }
        self.adv_refs
            .as_ref()
            .ok_or_else(|| TransportError::InvalidState("advertisement missing".to_string()))
    }

    fn close(&mut self) {
        if self.state != State::Closed {
            tracing::info!(endpoint = %self.endpoint.redacted(), service = %self.service, "session closed");
        }
        self.state = State::Closed;
    }
}

/// Maps non-success statuses to transport errors.
fn check_status(response: Response, url: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    tracing::debug!(%url, status = status.as_u16(), "HTTP request failed");
    Err(match status {
        StatusCode::UNAUTHORIZED => TransportError::AuthenticationRequired,
        StatusCode::FORBIDDEN => TransportError::AuthorizationFailed,
        StatusCode::NOT_FOUND => TransportError::RepositoryNotFound,
        _ => TransportError::Http {
            status: status.as_u16(),
            url: url.to_string(),
        },
    })
}

/// Upload-pack over HTTP.
pub struct HttpFetchPackSession {
    session: HttpSession,
    response: Option<PktLineReader<Response>>,
}

impl Session for HttpFetchPackSession {
    fn advertised_references(&mut self) -> Result<&AdvRefs> {
        self.session.advertised_references()
    }

    fn close(&mut self) -> Result<()> {
        self.response = None;
        self.session.close();
        Ok(())
    }
}

impl FetchPackSession for HttpFetchPackSession {
    fn fetch_pack(&mut self, request: &UploadPackRequest) -> Result<UploadPackResponse<'_>> {
        self.session.ensure_open()?;
        if request.is_empty() {
            return Err(TransportError::EmptyUploadPackRequest);
        }
        let adv = self.session.advertised_references()?;
        request.validate(&adv.capabilities)?;
        self.session.state = State::Exchanging;

        let mut body = Vec::new();
        request.encode(&mut body)?;

        let url = self.session.service_url();
        let service = self.session.service;
        tracing::debug!(%url, wants = request.wants.len(), haves = request.haves.len(), "posting upload-pack request");
        let response = self
            .session
            .with_auth(self.session.client.post(&url))
            .header(CONTENT_TYPE, service.request_content_type())
            .header(ACCEPT, service.result_content_type())
            .body(body)
            .send()?;
        let response = check_status(response, &url)?;

        let endpoint = self.session.endpoint.clone();
        let reader = self.response.insert(PktLineReader::new(response));
        read_upload_pack_response(reader, request)
            .map_err(|e| TransportError::from_protocol(e, "read upload-pack response", &endpoint))
    }
}

/// Receive-pack over HTTP. Discovery works; pushing is not implemented.
#[derive(Debug)]
pub struct HttpSendPackSession {
    session: HttpSession,
}

impl Session for HttpSendPackSession {
    fn advertised_references(&mut self) -> Result<&AdvRefs> {
        self.session.advertised_references()
    }

    fn close(&mut self) -> Result<()> {
        self.session.close();
        Ok(())
    }
}

impl SendPackSession for HttpSendPackSession {
    fn send_pack(&mut self, _request: ReferenceUpdateRequest) -> Result<ReportStatus> {
        self.session.ensure_open()?;
        Err(TransportError::NotSupported("not supported yet".to_string()))
    }
}
