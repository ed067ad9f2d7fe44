//! services/callback_service.rs
//! Registro y ejecución de callbacks del ciclo de vida (before_job, before_script, ...).
//!
//! Los callbacks se declaran en un archivo JSON (SIMPLY_MIGRATE_CALLBACK_FILE) y pueden
//! ser comandos de shell o webhooks. Ambos reciben el `CallbackContext` serializado y
//! su salida se interpreta con [`CallbackOutcome::from_output`].

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::models::callback_model::{
    CallbackContext, CallbackDefinition, CallbackFile, CallbackHook, CallbackKind,
    CallbackOutcome, CallbackResult,
};

#[async_trait]
pub trait Callback: Send + Sync {
    fn name(&self) -> &str;

    async fn call(&self, context: &CallbackContext) -> Result<CallbackOutcome>;
}

/// Callback definido en código (útil para embebidos y tests)
pub struct FnCallback<F> {
    name: String,
    func: F,
}

impl<F> FnCallback<F>
where
    F: Fn(&CallbackContext) -> Result<CallbackOutcome> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        FnCallback {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> Callback for FnCallback<F>
where
    F: Fn(&CallbackContext) -> Result<CallbackOutcome> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, context: &CallbackContext) -> Result<CallbackOutcome> {
        (self.func)(context)
    }
}

/// Ejecuta `sh -c <command>` con el contexto en stdin
pub struct CommandCallback {
    name: String,
    command: String,
    env: HashMap<String, String>,
    timeout: Duration,
}

impl CommandCallback {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        env: HashMap<String, String>,
        timeout: Duration,
    ) -> Self {
        CommandCallback {
            name: name.into(),
            command: command.into(),
            env,
            timeout,
        }
    }
}

#[async_trait]
impl Callback for CommandCallback {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, context: &CallbackContext) -> Result<CallbackOutcome> {
        let input = serde_json::to_vec(context).context("No se pudo serializar el contexto")?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .envs(&self.env)
            .env("SIMPLY_MIGRATE_JOB_ID", &context.job_id)
            .env("SIMPLY_MIGRATE_TENANT_ID", &context.tenant_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let run = async {
            let mut child = cmd
                .spawn()
                .with_context(|| format!("Failed to spawn callback command {}", self.command))?;

            if let Some(mut stdin) = child.stdin.take() {
                // el comando puede no leer stdin; un broken pipe no es error
                let _ = stdin.write_all(&input).await;
            }

            let output = child.wait_with_output().await?;
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                return Err(anyhow!(if stderr.is_empty() {
                    format!("command exited with code {:?}", output.status.code())
                } else {
                    stderr
                }));
            }

            Ok::<_, anyhow::Error>(CallbackOutcome::from_output(&stdout))
        };

        timeout(self.timeout, run)
            .await
            .map_err(|_| anyhow!("callback timed out after {:?}", self.timeout))?
    }
}

/// POST del contexto a una URL
pub struct WebhookCallback {
    name: String,
    url: String,
    headers: HashMap<String, String>,
    timeout: Duration,
    http_client: Client,
}

impl WebhookCallback {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        headers: HashMap<String, String>,
        timeout: Duration,
    ) -> Self {
        WebhookCallback {
            name: name.into(),
            url: url.into(),
            headers,
            timeout,
            http_client: Client::new(),
        }
    }
}

#[async_trait]
impl Callback for WebhookCallback {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, context: &CallbackContext) -> Result<CallbackOutcome> {
        let mut request = self
            .http_client
            .post(&self.url)
            .timeout(self.timeout)
            .header("User-Agent", "simply-migrate-callbacks/1.0")
            .json(context);

        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Request to {} failed", self.url))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!("HTTP {}: {}", status, text));
        }

        Ok(CallbackOutcome::from_output(&text))
    }
}

/// Callbacks registrados por hook, en orden de registro.
#[derive(Default, Clone)]
pub struct CallbackRegistry {
    callbacks: HashMap<CallbackHook, Vec<Arc<dyn Callback>>>,
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .callbacks
            .iter()
            .map(|(hook, cbs)| (hook.as_str(), cbs.len()))
            .collect();
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &counts)
            .finish()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: CallbackHook, callback: Arc<dyn Callback>) {
        log::info!("Registering {} callback: {}", hook, callback.name());
        self.callbacks.entry(hook).or_default().push(callback);
    }

    pub fn count_for(&self, hook: CallbackHook) -> usize {
        self.callbacks.get(&hook).map(|v| v.len()).unwrap_or(0)
    }

    pub fn count(&self) -> usize {
        self.callbacks.values().map(|v| v.len()).sum()
    }

    /// Corre los callbacks del hook en orden.
    ///
    /// Se detiene en el primer fallo o skip; los objetos devueltos se mezclan en
    /// `context.metadata`.
    pub async fn run_callbacks(
        &self,
        hook: CallbackHook,
        context: &mut CallbackContext,
    ) -> CallbackResult {
        let Some(callbacks) = self.callbacks.get(&hook) else {
            return CallbackResult::ok();
        };

        log::debug!(
            "Running {} {} callback(s) for job={} tenant={}",
            callbacks.len(),
            hook,
            context.job_id,
            context.tenant_id
        );

        for callback in callbacks {
            log::info!("Running callback: {} ({})", callback.name(), hook);

            match callback.call(context).await {
                Ok(CallbackOutcome::Continue) => {}
                Ok(CallbackOutcome::Result(result)) => {
                    if !result.success || result.skip_script {
                        return result;
                    }
                    context.metadata.extend(result.data);
                }
                Ok(CallbackOutcome::Bool(false)) => {
                    return CallbackResult::fail(format!(
                        "Callback {} returned False",
                        callback.name()
                    ));
                }
                Ok(CallbackOutcome::Bool(true)) => {}
                Ok(CallbackOutcome::Data(data)) => context.metadata.extend(data),
                Err(e) => {
                    log::error!("Callback {} failed: {:?}", callback.name(), e);
                    return CallbackResult::fail(format!("Callback failed: {}", e));
                }
            }
        }

        CallbackResult::ok()
    }

    /// Carga callbacks desde el archivo JSON; devuelve cuántos se registraron.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read callback file {}", path.display()))?;
        let file: CallbackFile = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse callback file {}", path.display()))?;

        let loaded = file.callbacks.len();
        for definition in file.callbacks {
            let hook = definition.hook;
            self.register(hook, Self::build_callback(definition));
        }

        log::info!("Loaded {} callback(s) from {}", loaded, path.display());
        Ok(loaded)
    }

    fn build_callback(definition: CallbackDefinition) -> Arc<dyn Callback> {
        let timeout = Duration::from_millis(definition.timeout_ms);
        match definition.kind {
            CallbackKind::Command { command, env } => Arc::new(CommandCallback::new(
                definition.name,
                command,
                env,
                timeout,
            )),
            CallbackKind::Webhook { url, headers } => Arc::new(WebhookCallback::new(
                definition.name,
                url,
                headers,
                timeout,
            )),
        }
    }
}
