//! models/callback_model.rs
//! Tipos compartidos por el registro de callbacks (hooks del ciclo de vida de un job).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::migration_model::ScriptPayload;

/// Timeout por defecto de un callback externo (ms)
pub const DEFAULT_CALLBACK_TIMEOUT_MS: u64 = 30_000;

/// Puntos del ciclo de vida donde se pueden enganchar callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackHook {
    BeforeJob,
    AfterJob,
    BeforeTenant,
    AfterTenant,
    BeforeScript,
    AfterScript,
    OnError,
}

impl CallbackHook {
    pub const ALL: [CallbackHook; 7] = [
        CallbackHook::BeforeJob,
        CallbackHook::AfterJob,
        CallbackHook::BeforeTenant,
        CallbackHook::AfterTenant,
        CallbackHook::BeforeScript,
        CallbackHook::AfterScript,
        CallbackHook::OnError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackHook::BeforeJob => "before_job",
            CallbackHook::AfterJob => "after_job",
            CallbackHook::BeforeTenant => "before_tenant",
            CallbackHook::AfterTenant => "after_tenant",
            CallbackHook::BeforeScript => "before_script",
            CallbackHook::AfterScript => "after_script",
            CallbackHook::OnError => "on_error",
        }
    }
}

impl fmt::Display for CallbackHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallbackHook {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CallbackHook::ALL
            .iter()
            .copied()
            .find(|h| h.as_str() == s)
            .ok_or_else(|| format!("Hook desconocido: {}", s))
    }
}

/// Contexto que recibe cada callback
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackContext {
    pub job_id: String,
    pub tenant_id: String,
    pub script: Option<ScriptPayload>,
    pub scripts: Vec<ScriptPayload>,
    /// -1 fuera del loop de scripts
    pub current_script_index: i64,
    /// Metadata libre definida por el usuario
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CallbackContext {
    pub fn for_job(job_id: &str, scripts: Vec<ScriptPayload>) -> Self {
        CallbackContext {
            job_id: job_id.to_string(),
            tenant_id: String::new(),
            script: None,
            scripts,
            current_script_index: -1,
            metadata: HashMap::new(),
        }
    }

    pub fn for_tenant(job_id: &str, tenant_id: &str, scripts: Vec<ScriptPayload>) -> Self {
        CallbackContext {
            tenant_id: tenant_id.to_string(),
            ..CallbackContext::for_job(job_id, scripts)
        }
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Resultado de un callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackResult {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
    /// Si es true se salta el script actual
    #[serde(default)]
    pub skip_script: bool,
}

impl CallbackResult {
    pub fn ok() -> Self {
        CallbackResult {
            success: true,
            message: None,
            data: HashMap::new(),
            skip_script: false,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        CallbackResult {
            success: false,
            message: Some(message.into()),
            ..CallbackResult::ok()
        }
    }

    pub fn skip(message: Option<String>) -> Self {
        CallbackResult {
            message,
            skip_script: true,
            ..CallbackResult::ok()
        }
    }

    pub fn message_or_empty(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }
}

/// Lo que "devuelve" un callback antes de normalizarlo
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    /// Nada que reportar, se continúa
    Continue,
    Result(CallbackResult),
    Bool(bool),
    /// Se mezcla en `context.metadata`
    Data(HashMap<String, serde_json::Value>),
}

impl CallbackOutcome {
    /// Interpreta la salida textual (stdout o body HTTP) de un callback externo.
    pub fn from_output(output: &str) -> Self {
        let trimmed = output.trim();
        if trimmed.is_empty() {
            return CallbackOutcome::Continue;
        }

        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(serde_json::Value::Null) => CallbackOutcome::Continue,
            Ok(serde_json::Value::Bool(b)) => CallbackOutcome::Bool(b),
            Ok(serde_json::Value::Object(map)) => {
                if map.contains_key("success") || map.contains_key("skip_script") {
                    let success = map.get("success").and_then(|v| v.as_bool()).unwrap_or(true);
                    let skip_script = map
                        .get("skip_script")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    let message = map
                        .get("message")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string());
                    let data = map
                        .get("data")
                        .and_then(|v| v.as_object())
                        .map(|o| o.clone().into_iter().collect())
                        .unwrap_or_default();
                    CallbackOutcome::Result(CallbackResult {
                        success,
                        message,
                        data,
                        skip_script,
                    })
                } else {
                    CallbackOutcome::Data(map.into_iter().collect())
                }
            }
            // texto libre u otros valores JSON: solo se loguean
            _ => CallbackOutcome::Continue,
        }
    }
}

/// Tipo de callback declarado en el archivo de callbacks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallbackKind {
    /// Comando de shell; recibe el contexto como JSON por stdin
    Command {
        command: String,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// POST del contexto a una URL
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

fn default_timeout() -> u64 {
    DEFAULT_CALLBACK_TIMEOUT_MS
}

/// Entrada del archivo de callbacks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackDefinition {
    pub hook: CallbackHook,
    pub name: String,
    #[serde(flatten)]
    pub kind: CallbackKind,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

/// Formato del archivo apuntado por SIMPLY_MIGRATE_CALLBACK_FILE
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackFile {
    #[serde(default)]
    pub callbacks: Vec<CallbackDefinition>,
}
