//! Evaluation context for remappers.
//!
//! A [`RemapContext`] is an immutable snapshot: extending it (history,
//! iteration scope) always returns a new context. Read-only pieces shared by
//! every snapshot of one evaluation live in [`RemapEnv`] behind an `Arc`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::message::{FormatterCache, MessageCatalog, MessageSource, MissingMessage};

// =============================================================================
// EvalValue
// =============================================================================

/// Evaluation result - either a value or missing
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EvalValue {
    #[default]
    Missing,
    Value(JsonValue),
}

impl EvalValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, EvalValue::Missing)
    }

    pub fn into_value(self) -> Option<JsonValue> {
        match self {
            EvalValue::Value(v) => Some(v),
            EvalValue::Missing => None,
        }
    }

    pub fn as_value(&self) -> Option<&JsonValue> {
        match self {
            EvalValue::Value(v) => Some(v),
            EvalValue::Missing => None,
        }
    }

    /// JSON form where Missing collapses to null.
    pub fn into_json_or_null(self) -> JsonValue {
        self.into_value().unwrap_or(JsonValue::Null)
    }

    /// Missing, null, false, 0, "", [] and {} are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            EvalValue::Missing => false,
            EvalValue::Value(v) => match v {
                JsonValue::Null => false,
                JsonValue::Bool(b) => *b,
                JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
                JsonValue::String(s) => !s.is_empty(),
                JsonValue::Array(arr) => !arr.is_empty(),
                JsonValue::Object(obj) => !obj.is_empty(),
            },
        }
    }
}

impl From<JsonValue> for EvalValue {
    fn from(value: JsonValue) -> Self {
        EvalValue::Value(value)
    }
}

impl From<Option<JsonValue>> for EvalValue {
    fn from(value: Option<JsonValue>) -> Self {
        value.map(EvalValue::Value).unwrap_or(EvalValue::Missing)
    }
}

// =============================================================================
// Environment
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AppInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: String,
}

fn default_locale() -> String {
    "en".to_string()
}

/// Tunables for evaluation, loadable from YAML or JSON.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemapOptions {
    #[serde(default)]
    pub missing_message: MissingMessage,
    /// Last locale tried when resolving a message id.
    #[serde(default = "default_locale")]
    pub default_locale: String,
}

impl Default for RemapOptions {
    fn default() -> Self {
        Self {
            missing_message: MissingMessage::default(),
            default_locale: default_locale(),
        }
    }
}

impl RemapOptions {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, crate::RemapError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// Read-only environment shared by all context snapshots of an evaluation.
#[derive(Clone)]
pub struct RemapEnv {
    locale: String,
    messages: Arc<dyn MessageSource>,
    user: Option<UserInfo>,
    app: AppInfo,
    data: JsonValue,
    now: DateTime<Utc>,
    options: RemapOptions,
    formatters: Arc<FormatterCache>,
}

impl std::fmt::Debug for RemapEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemapEnv")
            .field("locale", &self.locale)
            .field("user", &self.user)
            .field("app", &self.app)
            .field("data", &self.data)
            .field("now", &self.now)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for RemapEnv {
    fn default() -> Self {
        Self::new(default_locale(), Arc::new(MessageCatalog::new()))
    }
}

impl RemapEnv {
    /// Environment for `locale`; the evaluation instant is taken now.
    pub fn new(locale: impl Into<String>, messages: Arc<dyn MessageSource>) -> Self {
        Self {
            locale: locale.into(),
            messages,
            user: None,
            app: AppInfo::default(),
            data: JsonValue::Null,
            now: Utc::now(),
            options: RemapOptions::default(),
            formatters: Arc::new(FormatterCache::new()),
        }
    }

    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_app(mut self, app: AppInfo) -> Self {
        self.app = app;
        self
    }

    /// Values exposed to the `context` operation.
    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = data;
        self
    }

    /// Pin the instant returned by `date.now`.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_options(mut self, options: RemapOptions) -> Self {
        self.options = options;
        self
    }

    /// Share a formatter cache across environments.
    pub fn with_formatters(mut self, formatters: Arc<FormatterCache>) -> Self {
        self.formatters = formatters;
        self
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn default_locale(&self) -> &str {
        &self.options.default_locale
    }

    pub fn messages(&self) -> &dyn MessageSource {
        self.messages.as_ref()
    }

    pub fn user(&self) -> Option<&UserInfo> {
        self.user.as_ref()
    }

    pub fn app(&self) -> &AppInfo {
        &self.app
    }

    pub fn data(&self) -> &JsonValue {
        &self.data
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn options(&self) -> &RemapOptions {
        &self.options
    }

    pub fn formatters(&self) -> &FormatterCache {
        &self.formatters
    }
}

// =============================================================================
// RemapContext
// =============================================================================

/// Element being visited by an array operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayScope {
    pub index: usize,
    pub length: usize,
    pub item: Arc<JsonValue>,
}

/// Values a pipeline has passed through, oldest first.
///
/// Persistent list: extending allocates one node and shares every earlier
/// entry with the parent snapshot.
#[derive(Debug, Clone, Default)]
pub struct History {
    head: Option<Arc<HistoryNode>>,
}

#[derive(Debug)]
struct HistoryNode {
    value: EvalValue,
    len: usize,
    prev: Option<Arc<HistoryNode>>,
}

impl History {
    pub fn len(&self) -> usize {
        self.head.as_ref().map_or(0, |node| node.len)
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Entry `index`, counted from the oldest.
    pub fn get(&self, index: usize) -> Option<&EvalValue> {
        let steps_back = self.len().checked_sub(index)?.checked_sub(1)?;
        self.nodes().nth(steps_back).map(|node| &node.value)
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<&EvalValue> {
        self.head.as_deref().map(|node| &node.value)
    }

    /// Entries oldest first.
    pub fn to_vec(&self) -> Vec<EvalValue> {
        let mut values: Vec<EvalValue> = self.nodes().map(|node| node.value.clone()).collect();
        values.reverse();
        values
    }

    fn push(&self, value: EvalValue) -> Self {
        let node = HistoryNode {
            value,
            len: self.len() + 1,
            prev: self.head.clone(),
        };
        Self {
            head: Some(Arc::new(node)),
        }
    }

    fn nodes(&self) -> impl Iterator<Item = &HistoryNode> {
        std::iter::successors(self.head.as_deref(), |node| node.prev.as_deref())
    }
}

/// Per-step evaluation snapshot.
#[derive(Debug, Clone)]
pub struct RemapContext {
    root: Arc<JsonValue>,
    history: History,
    array: Option<ArrayScope>,
    env: Arc<RemapEnv>,
}

impl RemapContext {
    pub fn new(root: JsonValue, env: Arc<RemapEnv>) -> Self {
        Self {
            root: Arc::new(root),
            history: History::default(),
            array: None,
            env,
        }
    }

    /// Context with `value` appended to history.
    pub fn with_history(&self, value: EvalValue) -> Self {
        Self {
            history: self.history.push(value),
            ..self.clone()
        }
    }

    /// Context visiting one element of an array operation.
    pub fn with_array_scope(&self, scope: ArrayScope) -> Self {
        Self {
            array: Some(scope),
            ..self.clone()
        }
    }

    /// Context evaluating against a different root value.
    pub fn with_root(&self, root: JsonValue) -> Self {
        Self {
            root: Arc::new(root),
            ..self.clone()
        }
    }

    pub fn root(&self) -> &JsonValue {
        &self.root
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_entry(&self, index: usize) -> Option<&EvalValue> {
        self.history.get(index)
    }

    pub fn array_scope(&self) -> Option<&ArrayScope> {
        self.array.as_ref()
    }

    pub fn env(&self) -> &RemapEnv {
        &self.env
    }

    pub fn shared_env(&self) -> Arc<RemapEnv> {
        Arc::clone(&self.env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> RemapContext {
        RemapContext::new(json!({"root": true}), Arc::new(RemapEnv::default()))
    }

    #[test]
    fn history_extension_leaves_parent_untouched() {
        let parent = context().with_history(EvalValue::Value(json!(1)));
        let child = parent.with_history(EvalValue::Value(json!(2)));
        assert_eq!(parent.history().len(), 1);
        assert_eq!(child.history().len(), 2);
        assert_eq!(child.history_entry(0), Some(&EvalValue::Value(json!(1))));
        assert_eq!(child.history_entry(1), Some(&EvalValue::Value(json!(2))));
        assert_eq!(child.root(), &json!({"root": true}));
    }

    #[test]
    fn array_scope_is_per_snapshot() {
        let parent = context();
        let child = parent.with_array_scope(ArrayScope {
            index: 1,
            length: 3,
            item: Arc::new(json!("b")),
        });
        assert!(parent.array_scope().is_none());
        assert_eq!(child.array_scope().map(|s| s.index), Some(1));
    }

    #[test]
    fn history_entries_are_shared_between_snapshots() {
        let parent = context().with_history(EvalValue::Value(json!([1, 2, 3])));
        let children: Vec<RemapContext> = (0..3)
            .map(|index| {
                parent.with_array_scope(ArrayScope {
                    index,
                    length: 3,
                    item: Arc::new(json!(index)),
                })
            })
            .map(|child| child.with_history(EvalValue::Value(json!("step"))))
            .collect();
        for child in &children {
            assert!(std::ptr::eq(
                child.history_entry(0).unwrap(),
                parent.history_entry(0).unwrap()
            ));
        }
        assert_eq!(children[2].history().len(), 2);
        assert_eq!(children[2].history().last(), Some(&EvalValue::Value(json!("step"))));
        assert_eq!(
            children[2].history().to_vec(),
            vec![EvalValue::Value(json!([1, 2, 3])), EvalValue::Value(json!("step"))]
        );
        assert_eq!(children[2].history_entry(2), None);
    }

    #[test]
    fn truthiness_distinguishes_missing_from_present_values() {
        assert!(!EvalValue::Missing.is_truthy());
        assert!(!EvalValue::Value(json!(null)).is_truthy());
        assert!(!EvalValue::Value(json!(0)).is_truthy());
        assert!(!EvalValue::Value(json!("")).is_truthy());
        assert!(!EvalValue::Value(json!([])).is_truthy());
        assert!(EvalValue::Value(json!("x")).is_truthy());
        assert!(EvalValue::Value(json!({"a": 1})).is_truthy());
        assert!(!EvalValue::Value(json!(null)).is_missing());
    }

    #[test]
    fn options_load_from_yaml_with_defaults() {
        let options = RemapOptions::from_yaml_str("missing_message: marker\n").unwrap();
        assert_eq!(options.missing_message, MissingMessage::Marker);
        assert_eq!(options.default_locale, "en");
        assert!(RemapOptions::from_yaml_str("unknown: 1\n").is_err());
    }

    #[test]
    fn context_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RemapContext>();
    }
}
