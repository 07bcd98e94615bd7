use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;
use volley_core::{
    Assertion, DataFile, ExecutionProfile, Extraction, MissPolicy, ObjectMap, PercentileMode,
    Request, RunnerConfig, Scenario, ScenarioSet, TemplateSyntax, Value, Variables,
};

/// A whole scenario document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct DocumentYaml {
    /// Global variables, visible to every scenario.
    #[serde(default)]
    pub variables: BTreeMap<String, serde_yaml::Value>,

    #[serde(default)]
    pub config: ConfigYaml,

    pub scenarios: Vec<ScenarioYaml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ConfigYaml {
    pub miss_policy: Option<MissPolicy>,
    pub template_syntax: Option<TemplateSyntax>,
    /// Default per-request timeout.
    pub timeout: Option<YamlDuration>,
    pub connect_timeout: Option<YamlDuration>,
    pub percentiles: Option<PercentileMode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ScenarioYaml {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub threads: Option<u64>,
    pub iterations: Option<u64>,
    pub ramp_up_seconds: Option<u64>,
    pub hold_seconds: Option<u64>,
    pub success_threshold: Option<f64>,

    #[serde(default)]
    pub variables: BTreeMap<String, serde_yaml::Value>,

    /// Data file name → CSV path, relative to the document.
    #[serde(default)]
    pub data_files: BTreeMap<String, PathBuf>,

    #[serde(default)]
    pub requests: Vec<RequestYaml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RequestYaml {
    /// Defaults to `request-<n>` (1-based position in the scenario).
    pub name: Option<String>,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(alias = "url")]
    pub endpoint: String,

    pub method: Option<String>,

    /// A string is sent as is; structured YAML is sent as JSON.
    pub body: Option<serde_yaml::Value>,

    #[serde(default, deserialize_with = "deserialize_scalars")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, deserialize_with = "deserialize_scalars")]
    pub params: BTreeMap<String, String>,

    #[serde(default)]
    pub variables: BTreeMap<String, serde_yaml::Value>,

    pub data_source: Option<String>,

    /// Response path → expected value (`exists` or `*` for presence only).
    #[serde(default, deserialize_with = "deserialize_scalars")]
    pub assertions: BTreeMap<String, String>,

    /// Variable name → response path.
    #[serde(default)]
    pub extract: BTreeMap<String, String>,

    pub timeout: Option<YamlDuration>,
}

fn default_protocol() -> String {
    "http".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    pub(crate) fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a non-negative, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// Maps whose values may be written as strings, numbers or booleans.
fn deserialize_scalars<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();

    for (k, v) in raw {
        let s = match v {
            serde_yaml::Value::Null => String::new(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::String(s) => s,
            _ => {
                return Err(serde::de::Error::custom(format!(
                    "`{k}` must be a string, number or boolean"
                )));
            }
        };
        out.insert(k, s);
    }

    Ok(out)
}

fn scalar_text(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Null => Some(String::new()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Scalars become text, mappings become maps, sequences become maps keyed by index.
pub(crate) fn yaml_to_value(value: &serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Mapping(m) => {
            let mut map = ObjectMap::with_capacity(m.len());
            for (k, v) in m {
                if let Some(key) = scalar_text(k) {
                    map.insert(Arc::from(key), yaml_to_value(v));
                }
            }
            Value::Map(map)
        }
        serde_yaml::Value::Sequence(items) => {
            let mut map = ObjectMap::with_capacity(items.len());
            for (i, v) in items.iter().enumerate() {
                map.insert(Arc::from(i.to_string()), yaml_to_value(v));
            }
            Value::Map(map)
        }
        serde_yaml::Value::Tagged(t) => yaml_to_value(&t.value),
        scalar => Value::from(scalar_text(scalar).unwrap_or_default()),
    }
}

fn variables(raw: &BTreeMap<String, serde_yaml::Value>) -> Variables {
    raw.iter()
        .map(|(k, v)| (Arc::from(k.as_str()), yaml_to_value(v)))
        .collect()
}

fn body_text(body: &serde_yaml::Value) -> anyhow::Result<String> {
    match scalar_text(body) {
        Some(text) => Ok(text),
        None => serde_json::to_string(body).context("body cannot be encoded as JSON"),
    }
}

pub(crate) async fn read_document(path: &Path) -> anyhow::Result<DocumentYaml> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read scenario document: {}", path.display()))?;
    parse_document(&text).with_context(|| format!("invalid scenario document: {}", path.display()))
}

pub(crate) fn parse_document(text: &str) -> anyhow::Result<DocumentYaml> {
    let doc: DocumentYaml = serde_yaml::from_str(text)?;
    if doc.scenarios.is_empty() {
        anyhow::bail!("`scenarios` is empty");
    }
    Ok(doc)
}

impl DocumentYaml {
    /// Settings from the `config` section on top of the defaults.
    pub(crate) fn runner_config(&self) -> RunnerConfig {
        let mut config = RunnerConfig::default();
        if let Some(policy) = self.config.miss_policy {
            config = config.miss_policy(policy);
        }
        if let Some(syntax) = self.config.template_syntax {
            config = config.template_syntax(syntax);
        }
        if let Some(timeout) = self.config.timeout {
            config = config.request_timeout(timeout.into_inner());
        }
        if let Some(mode) = self.config.percentiles {
            config = config.percentiles(mode);
        }
        config
    }

    /// Build the scenario set. Relative data file paths are resolved against `base_dir`.
    pub(crate) fn to_scenario_set(&self, base_dir: &Path) -> anyhow::Result<ScenarioSet> {
        let mut set = ScenarioSet::new();
        set.variables = variables(&self.variables);
        for scenario in &self.scenarios {
            let built = scenario
                .to_scenario(base_dir)
                .with_context(|| format!("scenario `{}`", scenario.name))?;
            set = set.scenario(built);
        }
        Ok(set)
    }
}

impl ScenarioYaml {
    fn to_scenario(&self, base_dir: &Path) -> anyhow::Result<Scenario> {
        let defaults = ExecutionProfile::default();
        let profile = ExecutionProfile {
            threads: self.threads.unwrap_or(defaults.threads),
            iterations: self.iterations.unwrap_or(defaults.iterations),
            ramp_up_seconds: self.ramp_up_seconds.unwrap_or(defaults.ramp_up_seconds),
            hold_seconds: self.hold_seconds.unwrap_or(defaults.hold_seconds),
            success_threshold: self.success_threshold.unwrap_or(defaults.success_threshold),
        };

        let mut scenario = Scenario::new(self.name.clone())
            .description(self.description.clone())
            .profile(profile);
        scenario.variables = variables(&self.variables);

        for (name, path) in &self.data_files {
            scenario = scenario.data_file(DataFile::new(name.clone(), base_dir.join(path)));
        }

        for (idx, request) in self.requests.iter().enumerate() {
            let name = request
                .name
                .clone()
                .unwrap_or_else(|| format!("request-{}", idx + 1));
            let built = request
                .to_request(&name)
                .with_context(|| format!("request `{name}`"))?;
            scenario = scenario.request(built);
        }

        Ok(scenario)
    }
}

impl RequestYaml {
    fn to_request(&self, name: &str) -> anyhow::Result<Request> {
        let mut request = Request::new(name, self.protocol.clone(), self.endpoint.clone());
        if let Some(method) = &self.method {
            request = request.method(method.clone());
        }
        if let Some(body) = &self.body {
            request = request.body(body_text(body)?);
        }
        for (k, v) in &self.headers {
            request = request.header(k.clone(), v.clone());
        }
        for (k, v) in &self.params {
            request = request.param(k.clone(), v.clone());
        }
        request.variables = variables(&self.variables);
        if let Some(source) = &self.data_source {
            request = request.data_source(source.clone());
        }
        for (path, expected) in &self.assertions {
            request = request.assert(Assertion::parse(path, expected)?);
        }
        for (variable, path) in &self.extract {
            request = request.extract(Extraction::parse(variable, path)?);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout.into_inner());
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    const DOC: &str = r#"
variables:
  baseUrl: http://localhost:8080
  admin:
    name: root
    ids: [1, 2]
config:
  missPolicy: strict
  templateSyntax: mustache
  timeout: 5s
  percentiles: histogram
scenarios:
  - name: checkout
    description: buy something
    threads: 4
    iterations: 10
    rampUpSeconds: 2
    successThreshold: 95
    dataFiles:
      users: data/users.csv
    requests:
      - name: login
        method: POST
        url: "{{baseUrl}}/login"
        headers:
          content-type: application/json
        body:
          username: "{{user}}"
          password: "{{password}}"
        dataSource: users
        assertions:
          status: 200
          $.token: exists
        extract:
          token: $.token
        timeout: 1500ms
      - protocol: mqtt
        endpoint: mqtt://broker:1883
        params:
          topic: orders
          qos: 1
"#;

    #[test]
    fn parses_a_full_document() {
        let doc = parse_document(DOC).unwrap();

        let config = doc.runner_config();
        assert_eq!(config.miss_policy, MissPolicy::Strict);
        assert_eq!(config.template_syntax, TemplateSyntax::Mustache);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.percentiles, PercentileMode::Histogram);

        let set = doc.to_scenario_set(Path::new("/plans")).unwrap();
        let admin = set.variables.get("admin").unwrap();
        assert_eq!(admin.get("name").and_then(Value::as_text), Some("root"));
        assert_eq!(admin.navigate(["ids", "1"]).and_then(Value::as_text), Some("2"));

        let s = &set.scenarios[0];
        assert_eq!(s.name, "checkout");
        assert_eq!(s.profile.threads, 4);
        assert_eq!(s.profile.iterations, 10);
        assert_eq!(s.profile.ramp_up_seconds, 2);
        assert_eq!(s.profile.hold_seconds, 0);
        assert_eq!(s.profile.success_threshold, 95.0);
        assert_eq!(s.data_files[0].path, Path::new("/plans/data/users.csv"));
        assert!(s.validate().is_ok());

        let login = &s.requests[0];
        assert_eq!(&*login.name, "login");
        assert_eq!(login.protocol, "http");
        assert_eq!(login.endpoint, "{{baseUrl}}/login");
        assert_eq!(login.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(login.assertions.len(), 2);
        assert_eq!(login.extract.len(), 1);
        let body: serde_json::Value = serde_json::from_str(login.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["username"], "{{user}}");

        let publish = &s.requests[1];
        assert_eq!(&*publish.name, "request-2");
        assert_eq!(
            publish.params,
            vec![
                ("qos".to_string(), "1".to_string()),
                ("topic".to_string(), "orders".to_string())
            ]
        );
    }

    #[test]
    fn rejects_typos_and_empty_documents() {
        let typo = "scenarios:\n  - name: a\n    thread: 2\n    requests: []\n";
        assert!(parse_document(typo).is_err());
        assert!(parse_document("scenarios: []\n").is_err());
        assert!(parse_document("variables: {}\n").is_err());
    }

    #[test]
    fn bad_response_paths_are_reported_with_context() {
        let doc = parse_document(
            "scenarios:\n  - name: s\n    requests:\n      - name: r\n        url: http://x\n        extract:\n          v: \"$.\"\n",
        )
        .unwrap();
        let err = doc.to_scenario_set(Path::new(".")).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("scenario `s`"), "{message}");
        assert!(message.contains("request `r`"), "{message}");
    }

    #[test]
    fn durations_accept_strings_and_numbers() {
        let parse = |s: &str| serde_yaml::from_str::<YamlDuration>(s).map(YamlDuration::into_inner);
        assert_eq!(parse("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse("3").unwrap(), Duration::from_secs(3));
        assert_eq!(parse("0.5").unwrap(), Duration::from_millis(500));
        assert!(parse("-1").is_err());
        assert!(parse("soon").is_err());
    }
}
