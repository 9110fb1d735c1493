use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;
use stampede_core::{Credential, ScenarioOptions, Stage, TestOptions, ThresholdSet, ThresholdSpec};

/// A resolved plan document: scenario options plus the run-level knobs that live next
/// to them in YAML.
#[derive(Debug, Clone, Default)]
pub(crate) struct Plan {
    pub options: TestOptions,
    pub credentials: Vec<Credential>,
    pub hard_stop: Option<Duration>,
    pub threshold_interval: Option<Duration>,
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PlanYaml {
    vus: Option<u64>,
    iterations: Option<u64>,
    #[serde(default)]
    duration: Option<YamlDuration>,

    #[serde(default)]
    scenarios: Vec<ScenarioYaml>,

    #[serde(default)]
    thresholds: BTreeMap<String, ThresholdsYaml>,

    #[serde(default)]
    credentials: Vec<CredentialYaml>,

    #[serde(default)]
    hard_stop: Option<YamlDuration>,
    #[serde(default)]
    threshold_interval: Option<YamlDuration>,
    #[serde(default)]
    request_timeout: Option<YamlDuration>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ScenarioYaml {
    name: Option<String>,

    /// constant-vus | ramping-vus | constant-arrival-rate | ramping-arrival-rate
    executor: Option<String>,

    #[serde(default, deserialize_with = "deserialize_tags")]
    tags: BTreeMap<String, String>,

    vus: Option<u64>,
    iterations: Option<u64>,
    #[serde(default)]
    duration: Option<YamlDuration>,
    #[serde(default)]
    graceful_stop: Option<YamlDuration>,
    #[serde(default)]
    start_time: Option<YamlDuration>,
    #[serde(default)]
    pacing: Option<YamlDuration>,

    // ramping-vus
    #[serde(rename = "startVUs")]
    start_vus: Option<u64>,
    #[serde(default)]
    stages: Vec<StageYaml>,

    // arrival-rate executors
    rate: Option<u64>,
    start_rate: Option<u64>,
    #[serde(default)]
    time_unit: Option<YamlDuration>,
    #[serde(rename = "preAllocatedVUs")]
    pre_allocated_vus: Option<u64>,
    #[serde(rename = "maxVUs")]
    max_vus: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct StageYaml {
    target: u64,
    #[serde(default)]
    duration: YamlDuration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CredentialYaml {
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ThresholdsYaml {
    One(ThresholdYaml),
    Many(Vec<ThresholdYaml>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ThresholdYaml {
    Expr(String),
    Full(ThresholdObjectYaml),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ThresholdObjectYaml {
    threshold: String,
    #[serde(default)]
    abort_on_fail: bool,
    #[serde(default)]
    delay_abort_eval: Option<YamlDuration>,
}

#[derive(Debug, Clone, Copy, Default)]
struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
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
                    .map(|secs| YamlDuration(Duration::from_secs(secs)))
                    .map_err(|_| E::custom("duration cannot be negative"))
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

fn deserialize_tags<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();

    for (k, v) in raw {
        let s = match v {
            serde_yaml::Value::Null => continue,
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::String(s) => s,
            _ => continue,
        };
        out.insert(k, s);
    }

    Ok(out)
}

pub(crate) async fn load_plan(path: &Path) -> anyhow::Result<Plan> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read plan: {}", path.display()))?;

    let doc: PlanYaml = serde_yaml::from_slice(&bytes)
        .with_context(|| format!("failed to parse plan YAML: {}", path.display()))?;

    let default_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("main");
    plan_from_yaml(doc, default_name)
}

fn plan_from_yaml(doc: PlanYaml, default_name: &str) -> anyhow::Result<Plan> {
    let PlanYaml {
        vus,
        iterations,
        duration,
        scenarios,
        thresholds,
        credentials,
        hard_stop,
        threshold_interval,
        request_timeout,
    } = doc;

    let total = scenarios.len();
    let scenarios = scenarios
        .into_iter()
        .enumerate()
        .map(|(idx, scenario)| {
            let fallback = if total <= 1 {
                default_name.to_string()
            } else {
                format!("scenario_{}", idx + 1)
            };
            scenario_yaml_into_options(scenario, fallback)
        })
        .collect();

    Ok(Plan {
        options: TestOptions {
            vus,
            iterations,
            duration: duration.map(YamlDuration::into_inner),
            scenarios,
            thresholds: parse_thresholds_map(thresholds)?,
        },
        credentials: credentials
            .into_iter()
            .map(|c| Credential::new(c.client_id, c.client_secret))
            .collect(),
        hard_stop: hard_stop.map(YamlDuration::into_inner),
        threshold_interval: threshold_interval.map(YamlDuration::into_inner),
        request_timeout: request_timeout.map(YamlDuration::into_inner),
    })
}

fn scenario_yaml_into_options(scenario: ScenarioYaml, default_name: String) -> ScenarioOptions {
    let ScenarioYaml {
        name,
        executor,
        tags,
        vus,
        iterations,
        duration,
        graceful_stop,
        start_time,
        pacing,
        start_vus,
        stages,
        rate,
        start_rate,
        time_unit,
        pre_allocated_vus,
        max_vus,
    } = scenario;

    ScenarioOptions {
        name: name.unwrap_or(default_name),
        tags: tags.into_iter().collect(),
        executor,
        vus,
        iterations,
        duration: duration.map(YamlDuration::into_inner),
        graceful_stop: graceful_stop.map(YamlDuration::into_inner),
        start_time: start_time.map(YamlDuration::into_inner),
        pacing: pacing.map(YamlDuration::into_inner),

        start_vus,
        stages: stages
            .into_iter()
            .map(|s| Stage {
                duration: s.duration.into_inner(),
                target: s.target,
            })
            .collect(),

        rate,
        start_rate,
        time_unit: time_unit.map(YamlDuration::into_inner),
        pre_allocated_vus,
        max_vus,
    }
}

fn parse_thresholds_map(raw: BTreeMap<String, ThresholdsYaml>) -> anyhow::Result<Vec<ThresholdSet>> {
    let mut out = Vec::with_capacity(raw.len());

    for (metric, v) in raw {
        let entries = match v {
            ThresholdsYaml::One(t) => vec![t],
            ThresholdsYaml::Many(v) => v,
        };

        if entries.is_empty() {
            anyhow::bail!("invalid thresholds for `{metric}`: empty list");
        }

        let thresholds = entries
            .into_iter()
            .map(|t| match t {
                ThresholdYaml::Expr(expression) => ThresholdSpec::new(expression),
                ThresholdYaml::Full(obj) => {
                    let spec = ThresholdSpec::new(obj.threshold);
                    if obj.abort_on_fail {
                        spec.abort_on_fail(obj.delay_abort_eval.map(YamlDuration::into_inner))
                    } else {
                        spec
                    }
                }
            })
            .collect();

        out.push(ThresholdSet { metric, thresholds });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture_path(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("plans")
            .join(name)
    }

    fn parse(yaml: &str) -> anyhow::Result<Plan> {
        let doc: PlanYaml = serde_yaml::from_str(yaml)?;
        plan_from_yaml(doc, "main")
    }

    #[test]
    fn tags_deserialize_simple_scalars_as_strings() {
        let plan = parse(
            r#"
scenarios:
  - executor: constant-vus
    tags:
      a: true
      b: 123
      c: x
"#,
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        let s = &plan.options.scenarios[0];
        assert_eq!(s.name, "main");
        assert_eq!(
            s.tags,
            vec![
                ("a".to_string(), "true".to_string()),
                ("b".to_string(), "123".to_string()),
                ("c".to_string(), "x".to_string()),
            ]
        );
    }

    #[test]
    fn thresholds_accept_strings_lists_and_objects() {
        let plan = parse(
            r#"
thresholds:
  Errors: "count<100"
  RTT:
    - "p(95)<350"
    - threshold: "avg<200"
      abortOnFail: true
      delayAbortEval: 10s
"#,
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        let sets = &plan.options.thresholds;
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].metric, "Errors");
        assert_eq!(sets[0].thresholds.len(), 1);

        assert_eq!(sets[1].metric, "RTT");
        let avg = &sets[1].thresholds[1];
        assert_eq!(avg.expression, "avg<200");
        assert!(avg.abort_on_fail);
        assert_eq!(avg.delay_abort_eval, Some(Duration::from_secs(10)));
        assert!(!sets[1].thresholds[0].abort_on_fail);
    }

    #[test]
    fn empty_threshold_list_is_rejected() {
        assert!(parse("thresholds:\n  RTT: []\n").is_err());
    }

    #[test]
    fn unknown_scenario_fields_are_rejected() {
        let err = parse("scenarios:\n  - executor: constant-vus\n    gracefullStop: 5s\n");
        assert!(err.is_err());
    }

    #[test]
    fn durations_accept_strings_and_numbers() {
        let plan = parse(
            r#"
duration: 90
hardStop: 1.5
requestTimeout: 750ms
scenarios:
  - startTime: 1m 30s
"#,
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        assert_eq!(plan.options.duration, Some(Duration::from_secs(90)));
        assert_eq!(plan.hard_stop, Some(Duration::from_millis(1500)));
        assert_eq!(plan.request_timeout, Some(Duration::from_millis(750)));
        assert_eq!(
            plan.options.scenarios[0].start_time,
            Some(Duration::from_secs(90))
        );

        assert!(parse("duration: -5\n").is_err());
    }

    #[tokio::test]
    async fn loads_get_nodes_plan() {
        let plan = load_plan(&fixture_path("get_nodes.yaml"))
            .await
            .unwrap_or_else(|e| panic!("{e:#}"));

        assert_eq!(plan.options.scenarios.len(), 1);
        let s = &plan.options.scenarios[0];
        assert_eq!(s.name, "Minimal_Load");
        assert_eq!(s.executor.as_deref(), Some("constant-vus"));
        assert_eq!(s.vus, Some(1));
        assert_eq!(s.duration, Some(Duration::from_secs(120)));
        assert_eq!(s.graceful_stop, Some(Duration::from_secs(5)));

        assert_eq!(plan.credentials.len(), 2);
        assert_eq!(plan.credentials[1].id, "reporting");
        assert_eq!(plan.credentials[1].secret(), "reporting-secret");

        let rtt = plan
            .options
            .thresholds
            .iter()
            .find(|t| t.metric == "RTT")
            .unwrap_or_else(|| panic!("RTT thresholds missing"));
        assert_eq!(rtt.thresholds.len(), 3);
    }

    #[tokio::test]
    async fn loads_multi_scenario_plan() {
        let plan = load_plan(&fixture_path("multi.yaml"))
            .await
            .unwrap_or_else(|e| panic!("{e:#}"));

        let names: Vec<&str> = plan
            .options
            .scenarios
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["warmup", "scenario_2", "spike"]);

        let ramp = &plan.options.scenarios[1];
        assert_eq!(ramp.start_vus, Some(0));
        assert_eq!(ramp.stages.len(), 2);

        let spike = &plan.options.scenarios[2];
        assert_eq!(spike.executor.as_deref(), Some("ramping-arrival-rate"));
        assert_eq!(spike.time_unit, Some(Duration::from_secs(1)));
        assert_eq!(spike.pre_allocated_vus, Some(5));
        assert_eq!(spike.max_vus, Some(20));
        assert_eq!(spike.start_time, Some(Duration::from_secs(30)));

        assert_eq!(plan.threshold_interval, Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn missing_plan_file_is_an_error() {
        let err = load_plan(&fixture_path("does-not-exist.yaml")).await;
        assert!(err.is_err());
    }
}
