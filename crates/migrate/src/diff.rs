//! Diff computation for resources
//!
//! Compares the source representation of a resource with the target one,
//! field by field, and reports a [`ChangeRecord`]. Arrays of objects are
//! matched by an identity key (a policy is matched by its name, not its
//! position), so reordering alone is never a change.

use crate::types::{ResourceKind, ResourceNode, ResourceRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Fields the target platform generates or bumps on its own
pub const DEFAULT_IGNORED_FIELDS: &[&str] = &[
    "revision",
    "createdAt",
    "lastModifiedAt",
    "created_at",
    "last_modified",
    "lastModified",
    "appId",
    "app_id",
    "developerId",
    "metaData",
];

/// Kind of a single field change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Present only in the source
    Added,
    /// Present only in the target
    Removed,
    /// Present in both with different values
    Modified,
}

/// A single field-level difference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Location of the field, e.g. `policies[name=Quota-1].type`
    pub path: String,
    pub kind: ChangeKind,
    pub source: Option<Value>,
    pub target: Option<Value>,
}

impl Change {
    fn added(path: String, value: &Value) -> Self {
        Self {
            path,
            kind: ChangeKind::Added,
            source: Some(value.clone()),
            target: None,
        }
    }

    fn removed(path: String, value: &Value) -> Self {
        Self {
            path,
            kind: ChangeKind::Removed,
            source: None,
            target: Some(value.clone()),
        }
    }

    fn modified(path: String, source: Option<&Value>, target: Option<&Value>) -> Self {
        Self {
            path,
            kind: ChangeKind::Modified,
            source: source.cloned(),
            target: target.cloned(),
        }
    }
}

/// Which sides of a comparison held the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Both,
    SourceOnly,
    TargetOnly,
    Neither,
}

/// Outcome of comparing one source/target pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// The compared resource (absent when both sides were absent)
    pub reference: Option<ResourceRef>,
    pub presence: Presence,
    pub changes: Vec<Change>,
    /// Whether the target must be created or updated
    pub requires_action: bool,
}

impl ChangeRecord {
    /// Check if any difference was found
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Whether the resource is missing on the target
    pub fn is_addition(&self) -> bool {
        self.presence == Presence::SourceOnly
    }

    /// Whether the resource exists only on the target
    pub fn is_target_only(&self) -> bool {
        self.presence == Presence::TargetOnly
    }

    /// Number of changes of a given kind
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.changes.iter().filter(|c| c.kind == kind).count()
    }
}

/// Options driving the comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    /// Field names whose differences never require action
    pub ignored_fields: BTreeSet<String>,
    /// Per-kind identity keys for arrays, by the field holding the array
    pub identity_keys: BTreeMap<ResourceKind, BTreeMap<String, String>>,
    /// Identity key used when no per-kind key is configured
    pub default_identity_key: String,
}

impl Default for DiffOptions {
    fn default() -> Self {
        let mut identity_keys: BTreeMap<ResourceKind, BTreeMap<String, String>> = BTreeMap::new();
        identity_keys
            .entry(ResourceKind::DeveloperApp)
            .or_default()
            .insert("credentials".into(), "consumerKey".into());
        identity_keys
            .entry(ResourceKind::DeveloperApp)
            .or_default()
            .insert("apiProducts".into(), "apiproduct".into());
        identity_keys
            .entry(ResourceKind::Kvm)
            .or_default()
            .insert("entries".into(), "name".into());

        Self {
            ignored_fields: DEFAULT_IGNORED_FIELDS
                .iter()
                .map(ToString::to_string)
                .collect(),
            identity_keys,
            default_identity_key: "name".into(),
        }
    }
}

impl DiffOptions {
    /// Identity key for the array held by `field` on a resource of `kind`
    pub fn identity_key(&self, kind: ResourceKind, field: &str) -> &str {
        self.identity_keys
            .get(&kind)
            .and_then(|keys| keys.get(field))
            .map_or(self.default_identity_key.as_str(), String::as_str)
    }

    /// Whether a change at `path` is covered by the ignored fields
    ///
    /// Matches the whole path or the field name of any segment.
    pub fn is_ignored(&self, path: &str) -> bool {
        self.ignored_fields.contains(path)
            || path_segments(path)
                .iter()
                .any(|segment| self.ignored_fields.contains(*segment))
    }
}

/// Structural comparison of source and target representations
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    options: DiffOptions,
}

impl DiffEngine {
    pub fn new(options: DiffOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Compare a source resource with its target counterpart
    ///
    /// - target absent: every source field is `added` and action is required
    /// - source absent: every target field is `removed`; drift only, no action
    /// - both present: structural comparison of the payloads
    pub fn compare(
        &self,
        source: Option<&ResourceNode>,
        target: Option<&ResourceNode>,
    ) -> ChangeRecord {
        let reference = source.or(target).map(|n| n.reference.clone());

        match (source, target) {
            (None, None) => ChangeRecord {
                reference,
                presence: Presence::Neither,
                changes: Vec::new(),
                requires_action: false,
            },
            (Some(source), None) => ChangeRecord {
                reference,
                presence: Presence::SourceOnly,
                changes: top_level(&source.payload, Change::added),
                requires_action: true,
            },
            (None, Some(target)) => ChangeRecord {
                reference,
                presence: Presence::TargetOnly,
                changes: top_level(&target.payload, Change::removed),
                requires_action: false,
            },
            (Some(source), Some(target)) => {
                let changes = self.compare_values(source.kind(), &source.payload, &target.payload);
                let requires_action = changes.iter().any(|c| !self.options.is_ignored(&c.path));
                ChangeRecord {
                    reference,
                    presence: Presence::Both,
                    changes,
                    requires_action,
                }
            }
        }
    }

    /// Compare two payloads of a resource of `kind`
    pub fn compare_values(&self, kind: ResourceKind, source: &Value, target: &Value) -> Vec<Change> {
        let mut changes = Vec::new();
        self.diff_value(kind, "", "", source, target, &mut changes);
        changes
    }

    fn diff_value(
        &self,
        kind: ResourceKind,
        path: &str,
        field: &str,
        source: &Value,
        target: &Value,
        out: &mut Vec<Change>,
    ) {
        match (source, target) {
            (Value::Object(s), Value::Object(t)) => self.diff_objects(kind, path, s, t, out),
            (Value::Array(s), Value::Array(t)) => self.diff_arrays(kind, path, field, s, t, out),
            _ if source == target => {}
            _ => out.push(Change::modified(path.to_string(), Some(source), Some(target))),
        }
    }

    fn diff_objects(
        &self,
        kind: ResourceKind,
        path: &str,
        source: &Map<String, Value>,
        target: &Map<String, Value>,
        out: &mut Vec<Change>,
    ) {
        let keys: BTreeSet<&String> = source.keys().chain(target.keys()).collect();

        for key in keys {
            let child = join(path, key);
            match (source.get(key), target.get(key)) {
                (Some(s), Some(t)) => self.diff_value(kind, &child, key, s, t, out),
                // absent and empty are different states
                (Some(s), None) if is_empty_container(s) => {
                    out.push(Change::modified(child, Some(s), None));
                }
                (None, Some(t)) if is_empty_container(t) => {
                    out.push(Change::modified(child, None, Some(t)));
                }
                (Some(s), None) => out.push(Change::added(child, s)),
                (None, Some(t)) => out.push(Change::removed(child, t)),
                (None, None) => {}
            }
        }
    }

    fn diff_arrays(
        &self,
        kind: ResourceKind,
        path: &str,
        field: &str,
        source: &[Value],
        target: &[Value],
        out: &mut Vec<Change>,
    ) {
        let key = self.options.identity_key(kind, field);

        if let (Some(s), Some(t)) = (keyed(source, key), keyed(target, key)) {
            let ids: BTreeSet<&String> = s.keys().chain(t.keys()).collect();
            for id in ids {
                let child = format!("{path}[{key}={id}]");
                match (s.get(id), t.get(id)) {
                    (Some(sv), Some(tv)) => self.diff_value(kind, &child, field, sv, tv, out),
                    (Some(sv), None) => out.push(Change::added(child, sv)),
                    (None, Some(tv)) => out.push(Change::removed(child, tv)),
                    (None, None) => {}
                }
            }
        } else if source.iter().chain(target).all(is_scalar) {
            diff_scalar_sets(path, source, target, out);
        } else {
            for i in 0..source.len().max(target.len()) {
                let child = format!("{path}[{i}]");
                match (source.get(i), target.get(i)) {
                    (Some(sv), Some(tv)) => self.diff_value(kind, &child, field, sv, tv, out),
                    (Some(sv), None) => out.push(Change::added(child, sv)),
                    (None, Some(tv)) => out.push(Change::removed(child, tv)),
                    (None, None) => {}
                }
            }
        }
    }
}

/// Index array elements by identity key
///
/// Returns `None` unless every element is an object carrying a unique
/// scalar value under `key`.
fn keyed<'a>(items: &'a [Value], key: &str) -> Option<BTreeMap<String, &'a Value>> {
    let mut index = BTreeMap::new();
    for item in items {
        let id = match item.as_object()?.get(key)? {
            Value::String(s) => s.clone(),
            v if is_scalar(v) => v.to_string(),
            _ => return None,
        };
        if index.insert(id, item).is_some() {
            return None;
        }
    }
    Some(index)
}

/// Order-insensitive comparison of scalar arrays, honoring multiplicity
///
/// Elements are counted by their JSON text so `"100"` and `100` stay
/// distinct; the unquoted form only appears in the path.
fn diff_scalar_sets(path: &str, source: &[Value], target: &[Value], out: &mut Vec<Change>) {
    let mut counts: BTreeMap<String, (i64, &Value)> = BTreeMap::new();
    for v in source {
        counts.entry(v.to_string()).or_insert((0, v)).0 += 1;
    }
    for v in target {
        counts.entry(v.to_string()).or_insert((0, v)).0 -= 1;
    }

    for (balance, value) in counts.into_values() {
        let child = format!("{path}[{}]", canonical(value));
        for _ in 0..balance.max(0) {
            out.push(Change::added(child.clone(), value));
        }
        for _ in 0..(-balance).max(0) {
            out.push(Change::removed(child.clone(), value));
        }
    }
}

/// Changes covering every top-level field of a payload
fn top_level(payload: &Value, make: fn(String, &Value) -> Change) -> Vec<Change> {
    match payload {
        Value::Object(map) => map.iter().map(|(k, v)| make(k.clone(), v)).collect(),
        other => vec![make(String::new(), other)],
    }
}

fn canonical(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Field names along a path, ignoring bracketed element selectors
fn path_segments(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in path.char_indices() {
        match c {
            '[' => {
                if depth == 0 && start < i {
                    segments.push(&path[start..i]);
                }
                depth += 1;
            }
            ']' => {
                depth = depth.saturating_sub(1);
                start = i + 1;
            }
            '.' if depth == 0 => {
                if start < i {
                    segments.push(&path[start..i]);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth == 0 && start < path.len() {
        segments.push(&path[start..]);
    }
    segments
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    /// Resources missing on the target
    pub additions: usize,
    /// Resources present on both sides that need an update
    pub modifications: usize,
    /// Resources whose only differences are ignored fields
    pub ignored_drift: usize,
    /// Resources found only on the target
    pub target_only: usize,
    /// Resources already in sync
    pub unchanged: usize,
}

impl DiffSummary {
    /// Create a summary from a list of records
    pub fn from_records(records: &[ChangeRecord]) -> Self {
        let mut summary = Self::default();
        for record in records {
            if record.is_addition() {
                summary.additions += 1;
            } else if record.requires_action {
                summary.modifications += 1;
            } else if record.is_target_only() {
                summary.target_only += 1;
            } else if record.has_changes() {
                summary.ignored_drift += 1;
            } else {
                summary.unchanged += 1;
            }
        }
        summary
    }

    /// Number of resources that need action
    pub fn actionable(&self) -> usize {
        self.additions + self.modifications
    }

    /// Check if there are any changes to apply
    pub fn has_changes(&self) -> bool {
        self.actionable() > 0
    }
}

/// Group records by resource kind
pub fn group_by_kind(records: &[ChangeRecord]) -> BTreeMap<ResourceKind, Vec<&ChangeRecord>> {
    let mut groups: BTreeMap<ResourceKind, Vec<&ChangeRecord>> = BTreeMap::new();
    for record in records {
        if let Some(reference) = &record.reference {
            groups.entry(reference.kind).or_default().push(record);
        }
    }
    groups
}
