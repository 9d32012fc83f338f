//! Schema-guided record extraction
//!
//! An [`Extractor`] asks the model which records to create or patch in a
//! collection given a conversation and the records that already exist. The
//! answer is a list of [`RecordOp`]s that [`apply_ops`] writes to the store
//! one by one, collecting per-op failures in an [`ApplyReport`] instead of
//! aborting.
//!
//! A collection with inserts disabled holds a single record (a profile, a
//! set of guidelines); creating into it patches the existing record.

use crate::error::Result;
use crate::llm::{ChatRequest, OutputSchema};
use crate::messages::Message;
use crate::runtime::NodeContext;
use crate::store::{merge_patch, Item, Namespace, Store};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Write as _;
use tracing::{debug, info, warn};

/// Shape of the records in one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of a record; `required` is always enforced
    pub schema: Value,
    /// `false` turns the collection into a singleton
    pub enable_inserts: bool,
}

impl RecordSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            enable_inserts: true,
        }
    }

    pub fn singleton(mut self) -> Self {
        self.enable_inserts = false;
        self
    }

    /// Check a complete record against the schema
    pub fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        let Some(object) = value.as_object() else {
            return Err(format!("{} record must be a JSON object", self.name));
        };
        if let Some(required) = self.schema.get("required").and_then(Value::as_array) {
            for field in required.iter().filter_map(Value::as_str) {
                if object.get(field).map_or(true, Value::is_null) {
                    return Err(format!("{} record is missing required field '{field}'", self.name));
                }
            }
        }
        #[cfg(feature = "json-validation")]
        {
            let compiled = jsonschema::JSONSchema::compile(&self.schema)
                .map_err(|err| format!("invalid {} schema: {err}", self.name))?;
            if let Err(errors) = compiled.validate(value) {
                let messages: Vec<String> = errors.map(|err| err.to_string()).collect();
                return Err(messages.join("; "));
            }
        }
        Ok(())
    }
}

/// One write proposed by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum RecordOp {
    New { value: Value },
    Patch { key: String, value: Value },
}

/// An op as the model wrote it; `Err` carries why it could not be read
pub type ProposedOp = std::result::Result<RecordOp, String>;

#[derive(Debug, Deserialize)]
struct ExtractionResult {
    #[serde(default)]
    operations: Vec<Value>,
}

impl ExtractionResult {
    /// Read each op on its own so one malformed entry leaves the rest intact
    fn into_proposed(self) -> Vec<ProposedOp> {
        self.operations
            .into_iter()
            .map(|raw| serde_json::from_value::<RecordOp>(raw).map_err(|err| format!("malformed operation: {err}")))
            .collect()
    }
}

/// Outcome of one op
#[derive(Debug, Clone, PartialEq)]
pub enum OpOutcome {
    Created { key: String, value: Value },
    /// `converted` marks a `New` applied as a patch of a singleton
    Patched { key: String, value: Value, converted: bool },
    Failed { index: usize, error: String },
}

/// What [`apply_ops`] did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    pub record: String,
    pub outcomes: Vec<OpOutcome>,
}

impl ApplyReport {
    pub fn applied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| !matches!(outcome, OpOutcome::Failed { .. }))
            .count()
    }

    pub fn failures(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                OpOutcome::Failed { error, .. } => Some(error.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failures().is_empty()
    }

    /// Human-readable account, used as tool-result text
    pub fn summary(&self) -> String {
        if self.outcomes.is_empty() {
            return format!("No changes to {}.", self.record);
        }
        let mut text = String::new();
        for outcome in &self.outcomes {
            let _ = match outcome {
                OpOutcome::Created { key, value } => {
                    writeln!(text, "Created {} record {key}: {value}", self.record)
                }
                OpOutcome::Patched { key, value, .. } => {
                    writeln!(text, "Updated {} record {key}: {value}", self.record)
                }
                OpOutcome::Failed { index, error } => {
                    writeln!(text, "Operation {index} on {} failed: {error}", self.record)
                }
            };
        }
        text.trim_end().to_string()
    }
}

/// Apply `ops` to the records of `namespace`
///
/// `existing` is what the model was shown; it decides which record a
/// singleton `New` patches.
pub async fn apply_ops(
    store: &dyn Store,
    namespace: &Namespace,
    schema: &RecordSchema,
    existing: &[Item],
    ops: Vec<RecordOp>,
) -> ApplyReport {
    apply_proposed(store, namespace, schema, existing, ops.into_iter().map(Ok).collect()).await
}

/// [`apply_ops`] over ops that may have failed to parse; those are reported
/// as [`OpOutcome::Failed`] at their original index
pub async fn apply_proposed(
    store: &dyn Store,
    namespace: &Namespace,
    schema: &RecordSchema,
    existing: &[Item],
    ops: Vec<ProposedOp>,
) -> ApplyReport {
    let mut report = ApplyReport {
        record: schema.name.clone(),
        outcomes: Vec::with_capacity(ops.len()),
    };
    let mut singleton_key = if schema.enable_inserts {
        None
    } else {
        existing.first().map(|item| item.key.clone())
    };

    for (index, op) in ops.into_iter().enumerate() {
        let outcome = match op {
            Err(error) => Err(error),
            Ok(RecordOp::New { value }) => match singleton_key.clone() {
                Some(key) => patch_record(store, namespace, schema, &key, value, true).await,
                None => {
                    let key = uuid::Uuid::new_v4().to_string();
                    let created = create_record(store, namespace, schema, &key, value).await;
                    if !schema.enable_inserts && matches!(created, Ok(OpOutcome::Created { .. })) {
                        singleton_key = Some(key);
                    }
                    created
                }
            },
            Ok(RecordOp::Patch { key, value }) => {
                patch_record(store, namespace, schema, &key, value, false).await
            }
        };
        let outcome = outcome.unwrap_or_else(|error| {
            warn!(record = %schema.name, index, error = %error, "Record operation failed");
            OpOutcome::Failed { index, error }
        });
        report.outcomes.push(outcome);
    }

    info!(
        record = %schema.name,
        namespace = %namespace,
        applied = report.applied(),
        failed = report.failures().len(),
        "Applied record operations"
    );
    report
}

async fn create_record(
    store: &dyn Store,
    namespace: &Namespace,
    schema: &RecordSchema,
    key: &str,
    value: Value,
) -> std::result::Result<OpOutcome, String> {
    schema.validate(&value)?;
    let item = store
        .put(namespace, key, value)
        .await
        .map_err(|err| err.to_string())?;
    Ok(OpOutcome::Created {
        key: item.key,
        value: item.value,
    })
}

async fn patch_record(
    store: &dyn Store,
    namespace: &Namespace,
    schema: &RecordSchema,
    key: &str,
    value: Value,
    converted: bool,
) -> std::result::Result<OpOutcome, String> {
    if !value.is_object() {
        return Err(format!("{} patch must be a JSON object", schema.name));
    }
    let current = store
        .get(namespace, key)
        .await
        .map_err(|err| err.to_string())?
        .ok_or_else(|| format!("no {} record with key '{key}'", schema.name))?;

    let mut merged = current.value;
    merge_patch(&mut merged, &value);
    schema.validate(&merged)?;

    let item = store
        .patch(namespace, key, value)
        .await
        .map_err(|err| err.to_string())?;
    Ok(OpOutcome::Patched {
        key: item.key,
        value: item.value,
        converted,
    })
}

/// Asks the model for [`RecordOp`]s
#[derive(Debug, Clone)]
pub struct Extractor {
    schema: RecordSchema,
    instructions: String,
}

impl Extractor {
    pub fn new(schema: RecordSchema) -> Self {
        Self {
            schema,
            instructions: String::new(),
        }
    }

    /// Extra guidance prepended to the extraction prompt
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Structured output the model must follow
    pub fn output_schema(&self) -> OutputSchema {
        OutputSchema::new(
            "ExtractionResult",
            format!("Create or patch {} records", self.schema.name),
            json!({
                "type": "object",
                "properties": {
                    "operations": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "operation": {"type": "string", "enum": ["new", "patch"]},
                                "key": {"type": "string", "description": "Key of the record to patch"},
                                "value": self.schema.schema.clone()
                            },
                            "required": ["operation", "value"]
                        }
                    }
                },
                "required": ["operations"]
            }),
        )
    }

    fn prompt(&self, existing: &[Item]) -> String {
        let mut prompt = String::new();
        if !self.instructions.is_empty() {
            prompt.push_str(&self.instructions);
            prompt.push_str("\n\n");
        }
        let _ = writeln!(
            prompt,
            "Reflect on the conversation and decide which {} records to write. {}",
            self.schema.name, self.schema.description
        );
        if self.schema.enable_inserts {
            prompt.push_str(
                "Patch an existing record when the conversation changes it; create a new record only for new information.\n",
            );
        } else {
            prompt.push_str("There is a single record; patch it rather than creating another.\n");
        }
        if existing.is_empty() {
            prompt.push_str("\nThere are no existing records.");
        } else {
            prompt.push_str("\nExisting records:");
            for item in existing {
                let _ = write!(prompt, "\n- key {}: {}", item.key, item.value);
            }
        }
        prompt
    }

    /// Ops the model proposes; empty when the model is unavailable
    #[tracing::instrument(skip_all, fields(record = %self.schema.name, existing = existing.len()))]
    pub async fn extract(
        &self,
        ctx: &NodeContext,
        existing: &[Item],
        conversation: Vec<Message>,
    ) -> Result<Vec<ProposedOp>> {
        let mut messages = vec![Message::system(self.prompt(existing))];
        messages.extend(conversation);
        let request = ChatRequest::new(messages)
            .with_output_schema(self.output_schema())
            .with_temperature(0.0);

        let Some(response) = ctx.invoke_model(request).await? else {
            return Ok(Vec::new());
        };
        match response.parse::<ExtractionResult>() {
            Ok(result) => {
                debug!(ops = result.operations.len(), "Extraction proposed operations");
                Ok(result.into_proposed())
            }
            Err(err) => {
                warn!(error = %err, "Unusable extraction answer, no records written");
                Ok(Vec::new())
            }
        }
    }

    /// Extract from `conversation` and write the result under `namespace`
    pub async fn run(
        &self,
        ctx: &NodeContext,
        namespace: &Namespace,
        conversation: Vec<Message>,
    ) -> Result<ApplyReport> {
        let existing = ctx.store().search(namespace).await?;
        let existing: Vec<Item> = existing
            .into_iter()
            .filter(|item| &item.namespace == namespace)
            .collect();
        let ops = self.extract(ctx, &existing, conversation).await?;
        Ok(apply_proposed(ctx.store(), namespace, &self.schema, &existing, ops).await)
    }
}
