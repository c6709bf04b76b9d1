//! Sessions with a SlideRule deployment.

use crate::{
    auth::{Credentials, Tokens},
    handlers::{self, ArrowFiles, Handlers},
    SlideruleError,
};
use dashmap::DashMap;
use log::{debug, error, info, warn};
use records::{
    decode, DefinitionSource, FieldType, RawRecord, Record, RecordDef, RecordStream,
};
use reqwest::{
    blocking::{self, RequestBuilder, Response},
    header::{AUTHORIZATION, CONTENT_TYPE},
    Method, StatusCode,
};
use serde::Deserialize;
use serde_json::{json, Value as Json};
use std::{
    io::Read,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

pub const DEFAULT_URL: &str = "slideruleearth.io";
pub const PUBLIC_ORG: &str = "sliderule";

/// Service release this client speaks, compared against the versions
/// the service reports.
pub const CLIENT_VERSION: &str = "v4.0.0";

const STREAM_CHUNK: usize = 0x10_0000;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service host, without scheme.
    pub url: String,

    /// Organization cluster to address; `None` talks to `url` directly
    /// over plain HTTP.
    pub organization: Option<String>,

    /// Provisioning system base, `https://ps.{url}` when unset.
    pub provisioning: Option<String>,

    pub connect_timeout: Duration,
    pub read_timeout: Duration,

    /// Log the service's event and exception records.
    pub verbose: bool,

    /// Attempts made for requests that fail on the wire.
    pub attempts: u32,

    /// Where streamed files are written; the working directory when
    /// unset.
    pub output_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_owned(),
            organization: Some(PUBLIC_ORG.to_owned()),
            provisioning: None,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            verbose: false,
            attempts: 3,
            output_dir: None,
        }
    }
}

impl ClientConfig {
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn organization(mut self, organization: Option<&str>) -> Self {
        self.organization = organization.map(str::to_owned);
        self
    }

    pub fn provisioning(mut self, base: impl Into<String>) -> Self {
        self.provisioning = Some(base.into());
        self
    }

    /// Sets connection and read timeouts.
    pub fn timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    fn service_url(&self, path: &str, api: &str) -> String {
        match &self.organization {
            Some(org) => format!("https://{org}.{}{path}/{api}", self.url),
            None => format!("http://{}{path}/{api}", self.url),
        }
    }

    fn provisioning_url(&self, api: &str) -> String {
        match &self.provisioning {
            Some(base) => format!("{}/api/{api}", base.trim_end_matches('/')),
            None => format!("https://ps.{}/api/{api}", self.url),
        }
    }

    fn provisioning_host(&self) -> String {
        format!("ps.{}", self.url)
    }
}

/// Layout of a basic record field type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicType {
    pub ftype: FieldType,
    /// Bytes per element.
    pub size: usize,
}

/// A parsed service response.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Json(Json),
    Records(Vec<Record>),
}

#[derive(Deserialize)]
struct TokenReply {
    access: String,
    refresh: String,
    access_lifetime: Json,
}

impl TokenReply {
    fn into_tokens(self) -> Tokens {
        let lifetime = match &self.access_lifetime {
            Json::Number(n) => n.as_f64(),
            Json::String(s) => s.parse().ok(),
            _ => None,
        };
        Tokens::new(self.access, self.refresh, lifetime.unwrap_or_default())
    }
}

pub struct Client {
    config: ClientConfig,
    http: blocking::Client,
    tokens: Mutex<Option<Tokens>>,
    definitions: DashMap<String, Arc<RecordDef>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, SlideruleError> {
        let http = blocking::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()?;
        Ok(Self {
            config,
            http,
            tokens: Mutex::new(None),
            definitions: DashMap::new(),
        })
    }

    /// Opens a session: authenticates to `organization`, requests
    /// `desired_nodes` when given and checks that the service and the
    /// `icesat2` plugin speak this client's version.
    pub fn init(
        url: &str,
        organization: Option<&str>,
        desired_nodes: Option<u32>,
        verbose: bool,
    ) -> Result<Self, SlideruleError> {
        let config = ClientConfig::default()
            .url(url)
            .organization(organization)
            .verbose(verbose);
        let mut client = Self::new(config)?;
        if !client.authenticate(organization, None, None) && needs_credentials(organization) {
            warn!("continuing without authentication");
        }
        if let Some(nodes) = desired_nodes {
            let available = client.update_available_servers(Some(nodes), None)?;
            info!("{available} nodes available, {nodes} requested");
        }
        client.check_version(&["icesat2"])?;
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Calls a normal service and returns its JSON reply.
    pub fn call(&self, api: &str, parms: &Json) -> Result<Json, SlideruleError> {
        match self.source(api, parms, false, "/source", &mut Handlers::new())? {
            Reply::Json(json) => Ok(json),
            Reply::Records(_) => Err(SlideruleError::Fatal(format!(
                "{api} returned records where JSON was expected"
            ))),
        }
    }

    /// Calls a stream service and returns the records no handler
    /// consumed.
    pub fn stream(
        &self,
        api: &str,
        parms: &Json,
        handlers: &mut Handlers<'_>,
    ) -> Result<Vec<Record>, SlideruleError> {
        match self.source(api, parms, true, "/source", handlers)? {
            Reply::Records(records) => Ok(records),
            Reply::Json(json) => Err(SlideruleError::Fatal(format!(
                "{api} returned JSON where records were expected: {json}"
            ))),
        }
    }

    /// Issues `api` under `path`.
    ///
    /// Stream services are POSTed, everything else is a GET carrying a
    /// JSON body. Requests failing on the wire are reissued up to the
    /// configured number of attempts.
    pub fn source(
        &self,
        api: &str,
        parms: &Json,
        stream: bool,
        path: &str,
        handlers: &mut Handlers<'_>,
    ) -> Result<Reply, SlideruleError> {
        let url = self.config.service_url(path, api);
        let method = if stream { Method::POST } else { Method::GET };
        let body = serde_json::to_vec(parms)?;

        for attempt in 1..=self.config.attempts {
            debug!("{method} {url} (attempt {attempt})");
            let mut rqst = self
                .http
                .request(method.clone(), &url)
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
            if self.config.organization.is_some() {
                rqst = self.with_auth(rqst)?;
            }
            match self.exchange(rqst, &url, handlers) {
                Ok(reply) => return Ok(reply),
                Err(e) if is_retryable(&e) => {
                    warn!("{e} for {url}, retrying request");
                }
                Err(e) => return Err(e),
            }
        }
        Err(SlideruleError::Fatal(
            "Unable to complete request due to errors".to_owned(),
        ))
    }

    fn exchange(
        &self,
        rqst: RequestBuilder,
        url: &str,
        handlers: &mut Handlers<'_>,
    ) -> Result<Reply, SlideruleError> {
        let rsps = rqst.send()?;
        let status = rsps.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(SlideruleError::Transient(format!(
                "service unavailable at {url}"
            )));
        }
        if !status.is_success() {
            return Err(SlideruleError::Http {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        let content_type = rsps
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        if content_type.starts_with("application/octet-stream") {
            self.parse_records(rsps, handlers).map(Reply::Records)
        } else if content_type.starts_with("application/json")
            || content_type.starts_with("text/plain")
        {
            Ok(Reply::Json(rsps.json()?))
        } else {
            Err(SlideruleError::Fatal(format!(
                "unsupported content type: {content_type}"
            )))
        }
    }

    fn parse_records(
        &self,
        mut rsps: Response,
        handlers: &mut Handlers<'_>,
    ) -> Result<Vec<Record>, SlideruleError> {
        let mut framing = RecordStream::new();
        let mut arrow = ArrowFiles::new(self.config.output_dir.clone());
        let mut out = Vec::new();
        let mut buf = vec![0; STREAM_CHUNK];
        loop {
            let n = rsps.read(&mut buf)?;
            if n == 0 {
                break;
            }
            for raw in framing.feed(&buf[..n])? {
                self.dispatch(raw, handlers, &mut arrow, &mut out)?;
            }
        }
        if !framing.is_idle() {
            warn!("response ended inside a record");
        }
        Ok(out)
    }

    fn dispatch(
        &self,
        raw: RawRecord,
        handlers: &mut Handlers<'_>,
        arrow: &mut ArrowFiles,
        out: &mut Vec<Record>,
    ) -> Result<(), SlideruleError> {
        let rec = decode(&raw.rectype, &raw.data, self)?;
        if let Some(handler) = handlers.get_mut(&rec.rectype) {
            return handler(&rec);
        }
        match rec.rectype.as_str() {
            handlers::EVENTREC => handlers::log_event(&rec, self.config.verbose),
            handlers::EXCEPTREC => handlers::log_exception(&rec, self.config.verbose),
            handlers::ARROWREC_META | handlers::ARROWREC_DATA => arrow.handle(&rec)?,
            _ => out.push(rec),
        }
        Ok(())
    }

    /// Adds the bearer header, refreshing expired tokens first.
    fn with_auth(&self, rqst: RequestBuilder) -> Result<RequestBuilder, SlideruleError> {
        let mut guard = self
            .tokens
            .lock()
            .map_err(|_| SlideruleError::Fatal("token store poisoned".to_owned()))?;
        let Some(tokens) = guard.as_mut() else {
            return Ok(rqst);
        };
        if tokens.is_expired() {
            debug!("refreshing access token");
            let reply: TokenReply = self
                .http
                .post(self.config.provisioning_url("org_token/refresh/"))
                .bearer_auth(&tokens.access)
                .json(&json!({ "refresh": tokens.refresh }))
                .send()?
                .error_for_status()?
                .json()?;
            *tokens = reply.into_tokens();
        }
        Ok(rqst.header(AUTHORIZATION, format!("Bearer {}", tokens.access)))
    }

    /// Logs in to the provisioning system on behalf of `organization`.
    ///
    /// Returns whether tokens were obtained. `None` selects public
    /// access and always succeeds.
    pub fn authenticate(
        &mut self,
        organization: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
    ) -> bool {
        self.config.organization = organization.map(str::to_owned);
        let Some(org) = organization else {
            return true;
        };

        let host = self.config.provisioning_host();
        let Some(creds) = Credentials::resolve(&host, username, password) else {
            if needs_credentials(organization) {
                warn!("no credentials found for {host}");
            }
            return false;
        };

        let api = self.config.provisioning_url("org_token/");
        let login = || -> Result<Tokens, SlideruleError> {
            let reply: TokenReply = self
                .http
                .post(&api)
                .json(&json!({
                    "username": creds.username,
                    "password": creds.password,
                    "org_name": org,
                }))
                .send()?
                .error_for_status()?
                .json()?;
            Ok(reply.into_tokens())
        };
        match login() {
            Ok(tokens) => {
                if let Ok(mut guard) = self.tokens.lock() {
                    *guard = Some(tokens);
                }
                true
            }
            Err(e) => {
                error!("Unable to authenticate user {} to {api}: {e}", creds.username);
                false
            }
        }
    }

    /// Asks for `desired_nodes` in this organization's cluster, for
    /// `ttl_minutes` when given, and returns the number of nodes
    /// currently registered.
    pub fn update_available_servers(
        &self,
        desired_nodes: Option<u32>,
        ttl_minutes: Option<u32>,
    ) -> Result<u64, SlideruleError> {
        if let (Some(nodes), Some(org)) = (desired_nodes, &self.config.organization) {
            let rqst = match ttl_minutes {
                Some(ttl) => self.http.post(self.config.provisioning_url(&format!(
                    "desired_org_num_nodes_ttl/{org}/{nodes}/{ttl}/"
                ))),
                None => self.http.put(
                    self.config
                        .provisioning_url(&format!("desired_org_num_nodes/{org}/{nodes}/")),
                ),
            };
            self.with_auth(rqst)?.send()?.error_for_status()?;
        }

        let status = self.source(
            "status",
            &json!({ "service": "sliderule" }),
            false,
            "/discovery",
            &mut Handlers::new(),
        );
        match status {
            Ok(Reply::Json(json)) => Ok(json.get("nodes").and_then(Json::as_u64).unwrap_or(0)),
            Ok(Reply::Records(_)) => Ok(0),
            Err(e) if !e.is_transient() => {
                debug!("unable to read node count: {e}");
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    #[cfg(test)]
    fn current_access(&self) -> Option<String> {
        self.tokens
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|t| t.access.clone()))
    }

    /// Basic type of `field` in `rectype`.
    ///
    /// `None` when the record has no such field or the field is itself
    /// a record.
    pub fn get_definition(
        &self,
        rectype: &str,
        field: &str,
    ) -> Result<Option<BasicType>, SlideruleError> {
        let def = self.definition(rectype)?;
        let basic = def.field(field).and_then(|f| {
            let size = f.ftype.size()?;
            Some(BasicType {
                ftype: f.ftype.clone(),
                size,
            })
        });
        Ok(basic)
    }

    /// The service's version report, plus this client's version and
    /// organization.
    pub fn get_version(&self) -> Result<Json, SlideruleError> {
        let mut info = self.call("version", &json!({}))?;
        if let Some(obj) = info.as_object_mut() {
            obj.insert("client".to_owned(), json!({ "version": CLIENT_VERSION }));
            obj.insert("organization".to_owned(), json!(self.config.organization));
        }
        Ok(info)
    }

    /// Compares major and minor versions of the server and `plugins`
    /// with this client.
    ///
    /// A major mismatch is an error. Returns `false` when the server or
    /// a plugin is a minor version ahead.
    pub fn check_version(&self, plugins: &[&str]) -> Result<bool, SlideruleError> {
        let info = self.get_version()?;
        let client = parse_version(CLIENT_VERSION)?;
        let mut status = true;
        for entity in std::iter::once("server").chain(plugins.iter().copied()) {
            let reported = info
                .get(entity)
                .and_then(|e| e.get("version"))
                .and_then(Json::as_str)
                .ok_or_else(|| SlideruleError::Fatal(format!("no version reported for {entity}")))?;
            let version = parse_version(reported)?;
            if version.0 != client.0 {
                return Err(SlideruleError::Version {
                    entity: entity.to_owned(),
                    client: CLIENT_VERSION.to_owned(),
                    server: reported.to_owned(),
                });
            }
            if version.1 > client.1 {
                warn!("Client (version {CLIENT_VERSION}) is out of date with {entity} (version {reported})");
                status = false;
            }
        }
        Ok(status)
    }
}

impl DefinitionSource for Client {
    type Error = SlideruleError;

    fn definition(&self, rectype: &str) -> Result<Arc<RecordDef>, SlideruleError> {
        self.definitions
            .entry(rectype.to_owned())
            .or_try_insert_with(|| -> Result<_, SlideruleError> {
                let json = self.call("definition", &json!({ "rectype": rectype }))?;
                Ok(Arc::new(RecordDef::from_json(rectype, &json)?))
            })
            .map(|r| r.clone())
    }
}

/// Whether `organization` is a private cluster that requires a login.
fn needs_credentials(organization: Option<&str>) -> bool {
    organization.is_some_and(|org| org != PUBLIC_ORG)
}

/// Failures worth reissuing the request for.
fn is_retryable(e: &SlideruleError) -> bool {
    match e {
        SlideruleError::Request(e) => e.is_connect() || e.is_timeout() || e.is_body(),
        SlideruleError::Io(_) => true,
        _ => false,
    }
}

/// Parses `vMAJOR.MINOR.PATCH`.
fn parse_version(version: &str) -> Result<(u32, u32, u32), SlideruleError> {
    let invalid = || SlideruleError::Fatal(format!("invalid version string {version}"));
    let mut parts = version
        .get(1..)
        .ok_or_else(invalid)?
        .split('.')
        .map(|p| p.parse::<u32>().map_err(|_| invalid()));
    let mut next = || parts.next().unwrap_or_else(|| Err(invalid()));
    Ok((next()?, next()?, next()?))
}

#[cfg(test)]
mod tests {
    use super::{needs_credentials, parse_version, BasicType, Client, ClientConfig, CLIENT_VERSION};
    use crate::{
        handlers::Handlers,
        mock::{MockServer, Reply as MockReply, Request},
        SlideruleError,
    };
    use records::{DefinitionSource, FieldType, RawRecord, Record};
    use serde_json::json;
    use std::cell::Cell;

    fn client(server: &MockServer) -> Client {
        Client::new(
            ClientConfig::default()
                .url(server.host())
                .organization(None)
                .provisioning(server.base()),
        )
        .unwrap()
    }

    fn definitions(req: &Request) -> MockReply {
        match req.json()["rectype"].as_str() {
            Some("pair") => MockReply::json(json!({
                "__datasize": 4,
                "a": { "type": "UINT16", "offset": 0, "elements": 1, "flags": "LE" },
                "b": { "type": "INT16", "offset": 16, "elements": 1, "flags": "" },
            })),
            Some("eventrec") => MockReply::json(json!({
                "__datasize": 8,
                "level": { "type": "INT32", "offset": 0, "elements": 1, "flags": "LE" },
                "attr": { "type": "STRING", "offset": 32, "elements": 0, "flags": "" },
            })),
            Some("outer") => MockReply::json(json!({
                "__datasize": 4,
                "inner": { "type": "pair", "offset": 0, "elements": 1, "flags": "" },
            })),
            _ => MockReply::status(404),
        }
    }

    fn stream_body() -> Vec<u8> {
        let mut body = RawRecord {
            rectype: "pair".into(),
            data: vec![7, 0, 0xff, 0xfe],
        }
        .to_bytes();
        body.extend(
            RawRecord {
                rectype: "eventrec".into(),
                data: b"\x01\x00\x00\x00hi\0".to_vec(),
            }
            .to_bytes(),
        );
        body
    }

    #[test]
    fn test_service_urls() {
        let config = ClientConfig::default();
        assert_eq!(
            config.service_url("/source", "atl06p"),
            "https://sliderule.slideruleearth.io/source/atl06p"
        );
        assert_eq!(
            config.provisioning_url("org_token/"),
            "https://ps.slideruleearth.io/api/org_token/"
        );
        let config = config.organization(None).url("localhost:9081");
        assert_eq!(
            config.service_url("/discovery", "status"),
            "http://localhost:9081/discovery/status"
        );
    }

    #[test]
    fn test_call_json() {
        let server = MockServer::start(|req| {
            assert_eq!(req.method, "GET");
            assert_eq!(req.path, "/source/echo");
            MockReply::json(json!({ "got": req.json() }))
        });
        let reply = client(&server).call("echo", &json!({ "x": 1 })).unwrap();
        assert_eq!(reply, json!({ "got": { "x": 1 } }));
    }

    #[test]
    fn test_stream_records_and_definition_cache() {
        let server = MockServer::start(|req| match req.path.as_str() {
            "/source/definition" => definitions(req),
            "/source/pairs" => {
                assert_eq!(req.method, "POST");
                MockReply::records(stream_body())
            }
            _ => MockReply::status(404),
        });
        let client = client(&server);
        let records = client
            .stream("pairs", &json!({}), &mut Handlers::new())
            .unwrap();
        // The event record is consumed by its built-in handler.
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get_i64("a"), Some(7));
        assert_eq!(records[0].get_i64("b"), Some(-2));

        client.stream("pairs", &json!({}), &mut Handlers::new()).unwrap();
        let fetched = server
            .requests()
            .iter()
            .filter(|r| r.path == "/source/definition")
            .count();
        assert_eq!(fetched, 2);
        assert!(client.definition("pair").is_ok());
    }

    #[test]
    fn test_caller_handler_overrides_builtin() {
        let server = MockServer::start(|req| match req.path.as_str() {
            "/source/definition" => definitions(req),
            _ => MockReply::records(stream_body()),
        });
        let events = Cell::new(0);
        let mut handlers = Handlers::new().on("eventrec", |rec: &Record| {
            assert_eq!(rec.get_str("attr"), Some("hi"));
            events.set(events.get() + 1);
            Ok(())
        });
        let records = client(&server)
            .stream("pairs", &json!({}), &mut handlers)
            .unwrap();
        drop(handlers);
        assert_eq!(records.len(), 1);
        assert_eq!(events.get(), 1);
    }

    #[test]
    fn test_http_errors() {
        let server = MockServer::start(|req| match req.path.as_str() {
            "/source/busy" => MockReply::status(503),
            "/source/broken" => MockReply::status(500),
            _ => MockReply {
                status: 200,
                content_type: "text/html",
                body: b"<html/>".to_vec(),
            },
        });
        let client = client(&server);
        assert!(matches!(
            client.call("busy", &json!({})),
            Err(SlideruleError::Transient(_))
        ));
        assert!(matches!(
            client.call("broken", &json!({})),
            Err(SlideruleError::Http { status: 500, .. })
        ));
        let err = client.call("page", &json!({})).unwrap_err();
        assert!(err.to_string().contains("unsupported content type"));
    }

    #[test]
    fn test_retries_exhausted() {
        // Nothing listens on a freshly released port.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = Client::new(
            ClientConfig::default()
                .url(format!("127.0.0.1:{port}"))
                .organization(None)
                .attempts(2),
        )
        .unwrap();
        let err = client.call("version", &json!({})).unwrap_err();
        assert_eq!(err.to_string(), "Unable to complete request due to errors");
    }

    #[test]
    fn test_authenticate_and_bearer() {
        let server = MockServer::start(|req| match req.path.as_str() {
            "/api/org_token/" => {
                assert_eq!(req.json()["org_name"], "myorg");
                MockReply::json(json!({
                    "access": "A1", "refresh": "R1", "access_lifetime": "3600"
                }))
            }
            "/api/desired_org_num_nodes_ttl/myorg/5/30/" => {
                assert_eq!(req.header("authorization"), Some("Bearer A1"));
                MockReply::json(json!({}))
            }
            _ => MockReply::status(404),
        });
        let mut client = client(&server);
        assert!(client.authenticate(None, None, None));
        assert!(client.authenticate(Some("myorg"), Some("me"), Some("pw")));
        assert_eq!(client.current_access().as_deref(), Some("A1"));
        assert_eq!(client.config().organization.as_deref(), Some("myorg"));

        // Node count lookup goes to an unreachable cluster host; that
        // failure reads as zero nodes.
        let client = Client {
            config: client.config.clone().attempts(1),
            ..client
        };
        assert_eq!(client.update_available_servers(Some(5), Some(30)).unwrap(), 0);
        assert!(server
            .requests()
            .iter()
            .any(|r| r.method == "POST" && r.path.ends_with("/5/30/")));
    }

    #[test]
    fn test_expired_token_is_refreshed() {
        let server = MockServer::start(|req| match req.path.as_str() {
            "/api/org_token/" => MockReply::json(json!({
                "access": "A1", "refresh": "R1", "access_lifetime": 0
            })),
            "/api/org_token/refresh/" => {
                assert_eq!(req.method, "POST");
                assert_eq!(req.header("authorization"), Some("Bearer A1"));
                MockReply::json(json!({
                    "access": "A2", "refresh": "R2", "access_lifetime": 3600
                }))
            }
            _ => MockReply::json(json!({})),
        });
        let mut client = client(&server);
        assert!(client.authenticate(Some("myorg"), Some("me"), Some("pw")));
        let client = Client {
            config: client.config.clone().attempts(1),
            ..client
        };
        client.update_available_servers(Some(2), None).unwrap();

        let requests = server.requests();
        let refresh = requests
            .iter()
            .find(|r| r.path == "/api/org_token/refresh/")
            .unwrap();
        assert_eq!(refresh.json(), json!({ "refresh": "R1" }));
        let nodes = requests
            .iter()
            .find(|r| r.path == "/api/desired_org_num_nodes/myorg/2/")
            .unwrap();
        assert_eq!(nodes.method, "PUT");
        assert_eq!(nodes.header("authorization"), Some("Bearer A2"));
        assert_eq!(client.current_access().as_deref(), Some("A2"));
    }

    #[test]
    fn test_get_definition() {
        let server = MockServer::start(|req| match req.path.as_str() {
            "/source/definition" => definitions(req),
            _ => MockReply::status(404),
        });
        let client = client(&server);
        assert_eq!(
            client.get_definition("pair", "a").unwrap(),
            Some(BasicType {
                ftype: FieldType::UInt16,
                size: 2
            })
        );
        assert_eq!(client.get_definition("pair", "missing").unwrap(), None);
        assert_eq!(client.get_definition("outer", "inner").unwrap(), None);
        assert!(client.get_definition("unknown", "a").is_err());
    }

    #[test]
    fn test_public_org_needs_no_credentials() {
        assert!(!needs_credentials(None));
        assert!(!needs_credentials(Some("sliderule")));
        assert!(needs_credentials(Some("myorg")));
    }

    #[test]
    fn test_update_available_servers_public() {
        let server = MockServer::start(|req| {
            assert_eq!(req.path, "/discovery/status");
            assert_eq!(req.json(), json!({ "service": "sliderule" }));
            MockReply::json(json!({ "nodes": 7 }))
        });
        assert_eq!(client(&server).update_available_servers(Some(3), None).unwrap(), 7);
    }

    #[test]
    fn test_check_version() {
        let client_version = parse_version(CLIENT_VERSION).unwrap();
        let (major, minor) = (client_version.0, client_version.1);
        let server = MockServer::start(move |req| {
            assert_eq!(req.path, "/source/version");
            MockReply::json(json!({
                "server": { "version": format!("v{major}.{minor}.3") },
                "icesat2": { "version": format!("v{major}.{}.0", minor + 1) },
                "legacy": { "version": format!("v{}.0.0", major + 1) },
            }))
        });
        let client = client(&server);
        let info = client.get_version().unwrap();
        assert_eq!(info["client"]["version"], CLIENT_VERSION);
        assert!(info["organization"].is_null());
        assert!(client.check_version(&[]).unwrap());
        assert!(!client.check_version(&["icesat2"]).unwrap());
        assert!(matches!(
            client.check_version(&["legacy"]),
            Err(SlideruleError::Version { .. })
        ));
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("v4.0.2").unwrap(), (4, 0, 2));
        assert!(parse_version("v4.0").is_err());
        assert!(parse_version("").is_err());
    }
}
