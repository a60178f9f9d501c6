//! Client for a remote MLflow tracking server (REST API 2.0).

use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::time::Duration;

use chrono::Utc;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use walkdir::WalkDir;

use super::file_store::copy_artifact;
use super::{file_uri_to_path, TrackingClient};
use crate::error::{Result, TrackingError};
use crate::record::{
    ExperimentRecord, LifecycleStage, RunData, RunInfo, RunRecord, RunStatus, RunSummary,
    RUN_NAME_TAG,
};

const API_PREFIX: &str = "api/2.0/mlflow";
const ARTIFACTS_PREFIX: &str = "api/2.0/mlflow-artifacts/artifacts";
const ARTIFACTS_SCHEME: &str = "mlflow-artifacts:";
const SEARCH_PAGE_SIZE: u32 = 1000;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Connection settings, normally read from the `MLFLOW_*` environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestOptions {
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl Default for RestOptions {
    fn default() -> Self {
        Self {
            token: None,
            username: None,
            password: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl RestOptions {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let timeout = var("MLFLOW_HTTP_REQUEST_TIMEOUT")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self {
            token: var("MLFLOW_TRACKING_TOKEN"),
            username: var("MLFLOW_TRACKING_USERNAME"),
            password: var("MLFLOW_TRACKING_PASSWORD"),
            timeout: Duration::from_secs(timeout),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RestClient {
    base: String,
    http: Client,
    options: RestOptions,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiKeyValue {
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct ApiExperiment {
    experiment_id: String,
    name: String,
    #[serde(default)]
    artifact_location: String,
    #[serde(default)]
    lifecycle_stage: String,
    #[serde(default)]
    tags: Vec<ApiKeyValue>,
}

#[derive(Debug, Deserialize)]
struct ApiRunInfo {
    #[serde(default)]
    run_id: String,
    #[serde(default)]
    run_uuid: String,
    experiment_id: String,
    #[serde(default)]
    run_name: String,
    status: String,
    #[serde(default, deserialize_with = "de_opt_i64")]
    start_time: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    end_time: Option<i64>,
    #[serde(default)]
    lifecycle_stage: String,
    #[serde(default)]
    artifact_uri: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiRunData {
    #[serde(default)]
    params: Vec<ApiKeyValue>,
    #[serde(default)]
    tags: Vec<ApiKeyValue>,
}

#[derive(Debug, Deserialize)]
struct ApiRun {
    info: ApiRunInfo,
    #[serde(default)]
    data: ApiRunData,
}

#[derive(Debug, Deserialize)]
struct ExperimentResponse {
    experiment: ApiExperiment,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    run: ApiRun,
}

#[derive(Debug, Deserialize)]
struct SearchRunsResponse {
    #[serde(default)]
    runs: Vec<ApiRun>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// int64 fields arrive as JSON numbers or as decimal strings.
fn de_opt_i64<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Num(i64),
        Str(String),
    }
    match Option::<Int64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Int64::Num(n)) => Ok(Some(n)),
        Some(Int64::Str(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

fn pairs_to_map(pairs: Vec<ApiKeyValue>) -> BTreeMap<String, String> {
    pairs.into_iter().map(|kv| (kv.key, kv.value)).collect()
}

impl ApiExperiment {
    fn into_record(self) -> ExperimentRecord {
        ExperimentRecord {
            experiment_id: self.experiment_id,
            name: self.name,
            artifact_location: self.artifact_location,
            lifecycle_stage: LifecycleStage::parse_lenient(&self.lifecycle_stage),
            tags: pairs_to_map(self.tags),
        }
    }
}

impl ApiRun {
    fn into_record(self) -> Result<RunRecord> {
        let info = self.info;
        let data = RunData {
            params: pairs_to_map(self.data.params),
            tags: pairs_to_map(self.data.tags),
        };
        let run_id = if info.run_id.is_empty() {
            info.run_uuid
        } else {
            info.run_id
        };
        let run_name = if info.run_name.is_empty() {
            data.tags.get(RUN_NAME_TAG).cloned().unwrap_or_default()
        } else {
            info.run_name
        };
        Ok(RunRecord {
            info: RunInfo {
                run_id,
                experiment_id: info.experiment_id,
                run_name,
                status: info.status.parse()?,
                start_time: info.start_time,
                end_time: info.end_time,
                lifecycle_stage: LifecycleStage::parse_lenient(&info.lifecycle_stage),
                artifact_uri: info.artifact_uri,
            },
            data,
        })
    }
}

impl RestClient {
    pub fn new(base: &str, options: RestOptions) -> Result<Self> {
        let base = base.trim_end_matches('/').to_string();
        Url::parse(&base).map_err(|_| TrackingError::UnsupportedUri(base.clone()))?;
        let http = Client::builder().timeout(options.timeout).build()?;
        Ok(Self {
            base,
            http,
            options,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}/{}", self.base, API_PREFIX, method)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.options.token {
            request.bearer_auth(token)
        } else if let Some(user) = &self.options.username {
            request.basic_auth(user, self.options.password.as_ref())
        } else {
            request
        }
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder, method: &str) -> Result<T> {
        let resp = self.authorize(request).send()?;
        let status = resp.status();
        let body = resp.text()?;
        tracing::debug!(method, status = status.as_u16(), "tracking server response");
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }
        let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
        Ok(serde_json::from_str(body)?)
    }

    fn get<T: DeserializeOwned>(&self, method: &str, query: &[(&str, &str)]) -> Result<T> {
        self.send(self.http.get(self.endpoint(method)).query(query), method)
    }

    fn post<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T> {
        self.send(self.http.post(self.endpoint(method)).json(body), method)
    }

    fn upload_file(&self, url: Url, local: &Path) -> Result<()> {
        let bytes = std::fs::read(local).map_err(|e| TrackingError::io(local, e))?;
        tracing::debug!(url = %url, bytes = bytes.len(), "uploading artifact");
        let _: Value = self.send(self.http.put(url).body(bytes), "artifacts/upload")?;
        Ok(())
    }

    /// `mlflow-artifacts:/1/<run>/artifacts` becomes
    /// `<base>/api/2.0/mlflow-artifacts/artifacts/1/<run>/artifacts/<parts..>`.
    fn artifact_url(&self, artifact_uri: &str, parts: &[String]) -> Result<Url> {
        let unsupported = || TrackingError::Unsupported(format!("artifact URI '{}'", artifact_uri));
        let rest = artifact_uri
            .strip_prefix(ARTIFACTS_SCHEME)
            .ok_or_else(unsupported)?;
        // mlflow-artifacts://host:port/path carries its own authority; the
        // path is still served by this tracking server.
        let path = match rest.strip_prefix("//") {
            Some(after) => after.find('/').map(|idx| &after[idx..]).unwrap_or(""),
            None => rest,
        };
        let mut url = Url::parse(&self.base).map_err(|_| unsupported())?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| unsupported())?;
            segments.pop_if_empty();
            segments.extend(ARTIFACTS_PREFIX.split('/'));
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
            segments.extend(parts.iter());
        }
        Ok(url)
    }
}

fn api_error(status: u16, body: &str) -> TrackingError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) if !parsed.error_code.is_empty() || !parsed.message.is_empty() => {
            TrackingError::Api {
                status,
                code: parsed.error_code,
                message: parsed.message,
            }
        }
        _ => TrackingError::Api {
            status,
            code: String::new(),
            message: body.trim().to_string(),
        },
    }
}

fn path_parts(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

impl TrackingClient for RestClient {
    fn create_experiment(&self, name: &str, tags: &BTreeMap<String, String>) -> Result<String> {
        let tags: Vec<ApiKeyValue> = tags
            .iter()
            .map(|(k, v)| ApiKeyValue {
                key: k.clone(),
                value: v.clone(),
            })
            .collect();
        let body = json!({ "name": name, "tags": tags });
        let resp: CreateExperimentResponse =
            self.post("experiments/create", &body).map_err(|err| match err {
                TrackingError::Api { ref code, .. } if code == "RESOURCE_ALREADY_EXISTS" => {
                    TrackingError::AlreadyExists {
                        kind: "experiment",
                        name: name.to_string(),
                    }
                }
                other => other,
            })?;
        tracing::info!(experiment_id = %resp.experiment_id, name, "created experiment");
        Ok(resp.experiment_id)
    }

    fn get_experiment(&self, experiment_id: &str) -> Result<ExperimentRecord> {
        let resp: ExperimentResponse =
            self.get("experiments/get", &[("experiment_id", experiment_id)])?;
        Ok(resp.experiment.into_record())
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentRecord>> {
        match self.get::<ExperimentResponse>("experiments/get-by-name", &[("experiment_name", name)]) {
            Ok(resp) => Ok(Some(resp.experiment.into_record())),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn create_run(&self, experiment_id: &str, run_name: &str) -> Result<RunRecord> {
        let mut tags = vec![json!({ "key": RUN_NAME_TAG, "value": run_name })];
        if let Ok(user) = std::env::var("USER").or_else(|_| std::env::var("USERNAME")) {
            tags.push(json!({ "key": "mlflow.user", "value": user }));
        }
        let body = json!({
            "experiment_id": experiment_id,
            "run_name": run_name,
            "start_time": Utc::now().timestamp_millis(),
            "tags": tags,
        });
        let resp: RunResponse = self.post("runs/create", &body)?;
        let run = resp.run.into_record()?;
        tracing::info!(run_id = %run.run_id(), run_name, experiment_id, "created run");
        Ok(run)
    }

    fn get_run(&self, run_id: &str) -> Result<RunRecord> {
        let resp: RunResponse = self.get("runs/get", &[("run_id", run_id)])?;
        resp.run.into_record()
    }

    fn search_runs(&self, experiment_ids: &[&str], filter: &str) -> Result<Vec<RunSummary>> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut body = json!({
                "experiment_ids": experiment_ids,
                "filter": filter,
                "run_view_type": "ACTIVE_ONLY",
                "max_results": SEARCH_PAGE_SIZE,
                "order_by": ["attributes.start_time DESC"],
            });
            if let Some(token) = &page_token {
                body["page_token"] = Value::String(token.clone());
            }
            let resp: SearchRunsResponse = self.post("runs/search", &body)?;
            for run in resp.runs {
                out.push(run.into_record()?.summary());
            }
            match resp.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        tracing::debug!(matches = out.len(), "searched runs");
        Ok(out)
    }

    fn update_run_status(&self, run_id: &str, status: RunStatus) -> Result<()> {
        let mut body = json!({
            "run_id": run_id,
            "run_uuid": run_id,
            "status": status.as_str(),
        });
        if status.is_terminal() {
            body["end_time"] = json!(Utc::now().timestamp_millis());
        }
        let _: Value = self.post("runs/update", &body)?;
        tracing::debug!(run_id, status = %status, "updated run status");
        Ok(())
    }

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        let body = json!({
            "run_id": run_id,
            "run_uuid": run_id,
            "key": key,
            "value": value,
        });
        let _: Value = self.post("runs/log-parameter", &body)?;
        tracing::debug!(run_id, key, value, "logged param");
        Ok(())
    }

    fn log_artifact(&self, run_id: &str, local_path: &Path) -> Result<()> {
        let run = self.get_run(run_id)?;
        let artifact_uri = run.info.artifact_uri;
        if artifact_uri.starts_with("file:") {
            let root = file_uri_to_path(&artifact_uri)?;
            let copied = copy_artifact(local_path, &root)?;
            tracing::info!(run_id, path = %local_path.display(), files = copied, "logged artifact");
            return Ok(());
        }
        if !artifact_uri.starts_with(ARTIFACTS_SCHEME) {
            return Err(TrackingError::Unsupported(format!(
                "artifact URI '{}' needs a storage client this tool does not provide",
                artifact_uri
            )));
        }
        let name = local_path.file_name().ok_or_else(|| {
            TrackingError::InvalidParameter(format!(
                "artifact path {} has no file name",
                local_path.display()
            ))
        })?;
        let name = name.to_string_lossy().into_owned();

        if !local_path.is_dir() {
            let url = self.artifact_url(&artifact_uri, &[name])?;
            self.upload_file(url, local_path)?;
            tracing::info!(run_id, path = %local_path.display(), files = 1, "logged artifact");
            return Ok(());
        }
        let mut uploaded = 0usize;
        for entry in WalkDir::new(local_path).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(local_path)
                .map_err(|_| TrackingError::InvalidParameter(entry.path().display().to_string()))?;
            let mut parts = vec![name.clone()];
            parts.extend(path_parts(rel));
            let url = self.artifact_url(&artifact_uri, &parts)?;
            self.upload_file(url, entry.path())?;
            uploaded += 1;
        }
        tracing::info!(run_id, path = %local_path.display(), files = uploaded, "logged artifact");
        Ok(())
    }

    fn tracking_uri(&self) -> String {
        self.base.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::mpsc;
    use std::thread;

    #[derive(Debug, Clone)]
    struct Recorded {
        method: String,
        url: String,
        body: String,
        authorization: Option<String>,
    }

    /// Serves the canned `(status, body)` responses in order, then returns
    /// everything it received.
    fn mock_server(responses: Vec<(u16, String)>) -> (String, thread::JoinHandle<Vec<Recorded>>) {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("bind mock server");
        let addr = server.server_addr().to_ip().expect("ip listener");
        let (ready_tx, ready_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            ready_tx.send(()).expect("ready");
            let mut seen = Vec::new();
            for (status, body) in responses {
                let mut request = match server.recv_timeout(Duration::from_secs(10)) {
                    Ok(Some(req)) => req,
                    _ => break,
                };
                let mut received = String::new();
                request
                    .as_reader()
                    .read_to_string(&mut received)
                    .expect("read body");
                let authorization = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Authorization"))
                    .map(|h| h.value.to_string());
                seen.push(Recorded {
                    method: request.method().to_string(),
                    url: request.url().to_string(),
                    body: received,
                    authorization,
                });
                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("header");
                let response = tiny_http::Response::from_string(body)
                    .with_status_code(status)
                    .with_header(header);
                request.respond(response).expect("respond");
            }
            seen
        });
        ready_rx.recv().expect("server thread started");
        (format!("http://{}", addr), handle)
    }

    fn client(base: &str) -> RestClient {
        RestClient::new(base, RestOptions::default()).expect("client")
    }

    fn run_json(run_id: &str, name: &str, artifact_uri: &str) -> String {
        json!({
            "run": {
                "info": {
                    "run_id": run_id,
                    "experiment_id": "7",
                    "run_name": name,
                    "status": "RUNNING",
                    "start_time": "1700000000000",
                    "lifecycle_stage": "active",
                    "artifact_uri": artifact_uri,
                },
                "data": {
                    "tags": [{ "key": RUN_NAME_TAG, "value": name }],
                    "params": [{ "key": "optim.lr", "value": "0.1" }],
                }
            }
        })
        .to_string()
    }

    #[test]
    fn missing_experiment_by_name_is_none() {
        let (base, handle) = mock_server(vec![(
            404,
            r#"{"error_code":"RESOURCE_DOES_NOT_EXIST","message":"Could not find experiment with name 'x'"}"#
                .to_string(),
        )]);
        let found = client(&base).get_experiment_by_name("x").expect("lookup");
        assert!(found.is_none());
        let seen = handle.join().expect("server");
        assert_eq!(seen[0].method, "GET");
        assert_eq!(
            seen[0].url,
            "/api/2.0/mlflow/experiments/get-by-name?experiment_name=x"
        );
    }

    #[test]
    fn existing_experiment_by_name() {
        let body = json!({
            "experiment": {
                "experiment_id": "7",
                "name": "exp",
                "artifact_location": "mlflow-artifacts:/7",
                "lifecycle_stage": "deleted",
                "tags": [{ "key": "team", "value": "nlp" }],
            }
        });
        let (base, handle) = mock_server(vec![(200, body.to_string())]);
        let exp = client(&base)
            .get_experiment_by_name("exp")
            .expect("lookup")
            .expect("found");
        assert_eq!(exp.experiment_id, "7");
        assert!(!exp.is_active());
        assert_eq!(exp.tags.get("team").map(String::as_str), Some("nlp"));
        handle.join().expect("server");
    }

    #[test]
    fn search_follows_page_tokens() {
        fn page(ids: &[&str], token: Option<&str>) -> String {
            let runs: Vec<Value> = ids
                .iter()
                .map(|id| {
                    json!({
                        "info": {
                            "run_uuid": id,
                            "experiment_id": "7",
                            "status": "FINISHED",
                            "start_time": 1,
                        },
                        "data": { "tags": [{ "key": RUN_NAME_TAG, "value": "baseline" }] }
                    })
                })
                .collect();
            let mut body = json!({ "runs": runs });
            if let Some(token) = token {
                body["next_page_token"] = json!(token);
            }
            body.to_string()
        }
        let (base, handle) = mock_server(vec![
            (200, page(&["a", "b"], Some("next"))),
            (200, page(&["c"], None)),
        ]);
        let filter = crate::filter::run_name_filter("baseline");
        let hits = client(&base).search_runs(&["7"], &filter).expect("search");
        let ids: Vec<&str> = hits.iter().map(|r| r.run_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(hits.iter().all(|r| r.run_name == "baseline"));

        let seen = handle.join().expect("server");
        assert_eq!(seen.len(), 2);
        let first: Value = serde_json::from_str(&seen[0].body).expect("json");
        assert_eq!(first["experiment_ids"], json!(["7"]));
        assert_eq!(first["filter"], json!(filter));
        assert!(first.get("page_token").is_none());
        let second: Value = serde_json::from_str(&seen[1].body).expect("json");
        assert_eq!(second["page_token"], json!("next"));
    }

    #[test]
    fn log_param_posts_key_and_value() {
        let (base, handle) = mock_server(vec![(200, "{}".to_string())]);
        let options = RestOptions {
            token: Some("secret".to_string()),
            ..RestOptions::default()
        };
        RestClient::new(&base, options)
            .expect("client")
            .log_param("abc", "model.depth", "3")
            .expect("log param");
        let seen = handle.join().expect("server");
        assert_eq!(seen[0].method, "POST");
        assert_eq!(seen[0].url, "/api/2.0/mlflow/runs/log-parameter");
        assert_eq!(seen[0].authorization.as_deref(), Some("Bearer secret"));
        let body: Value = serde_json::from_str(&seen[0].body).expect("json");
        assert_eq!(body["run_id"], json!("abc"));
        assert_eq!(body["key"], json!("model.depth"));
        assert_eq!(body["value"], json!("3"));
    }

    #[test]
    fn server_errors_map_to_api_error() {
        let (base, handle) = mock_server(vec![
            (
                400,
                r#"{"error_code":"INVALID_PARAMETER_VALUE","message":"Changing param values is not allowed"}"#
                    .to_string(),
            ),
            (502, "bad gateway".to_string()),
        ]);
        let c = client(&base);
        match c.log_param("abc", "k", "v") {
            Err(TrackingError::Api {
                status,
                code,
                message,
            }) => {
                assert_eq!(status, 400);
                assert_eq!(code, "INVALID_PARAMETER_VALUE");
                assert!(message.contains("Changing param values"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        match c.get_run("abc") {
            Err(TrackingError::Api { status, message, .. }) => {
                assert_eq!(status, 502);
                assert_eq!(message, "bad gateway");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        handle.join().expect("server");
    }

    #[test]
    fn get_run_reads_string_timestamps() {
        let (base, handle) = mock_server(vec![(200, run_json("abc", "baseline", "mlflow-artifacts:/7/abc/artifacts"))]);
        let run = client(&base).get_run("abc").expect("run");
        assert_eq!(run.run_id(), "abc");
        assert_eq!(run.info.start_time, Some(1_700_000_000_000));
        assert_eq!(run.info.status, RunStatus::Running);
        assert_eq!(run.data.params.get("optim.lr").map(String::as_str), Some("0.1"));
        handle.join().expect("server");
    }

    #[test]
    fn terminating_sends_end_time() {
        let (base, handle) = mock_server(vec![(200, "{}".to_string())]);
        client(&base)
            .set_terminated("abc", RunStatus::Failed)
            .expect("terminate");
        let seen = handle.join().expect("server");
        assert_eq!(seen[0].url, "/api/2.0/mlflow/runs/update");
        let body: Value = serde_json::from_str(&seen[0].body).expect("json");
        assert_eq!(body["status"], json!("FAILED"));
        assert!(body["end_time"].is_i64());
    }

    #[test]
    fn directory_artifacts_are_uploaded_per_file() {
        let dir = std::env::temp_dir().join(format!(
            "mlt_rest_artifacts_{}_{}",
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        let snapshot = dir.join(".hydra");
        std::fs::create_dir_all(&snapshot).expect("snapshot dir");
        std::fs::write(snapshot.join("config.yaml"), "a: 1\n").expect("config");
        std::fs::write(snapshot.join("overrides.yaml"), "[]\n").expect("overrides");

        let (base, handle) = mock_server(vec![
            (200, run_json("abc", "r", "mlflow-artifacts:/7/abc/artifacts")),
            (200, "{}".to_string()),
            (200, "{}".to_string()),
        ]);
        client(&base)
            .log_artifact("abc", &snapshot)
            .expect("log artifact");
        let seen = handle.join().expect("server");
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1].method, "PUT");
        assert_eq!(
            seen[1].url,
            "/api/2.0/mlflow-artifacts/artifacts/7/abc/artifacts/.hydra/config.yaml"
        );
        assert_eq!(seen[1].body, "a: 1\n");
        assert_eq!(
            seen[2].url,
            "/api/2.0/mlflow-artifacts/artifacts/7/abc/artifacts/.hydra/overrides.yaml"
        );
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn options_default_timeout() {
        assert_eq!(RestOptions::default().timeout, Duration::from_secs(120));
    }
}
