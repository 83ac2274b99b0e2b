// JDWP connection management
//
// Session facade over the engine: attach, the initialization sequence, and
// best-effort detach on close

use crate::commands::{Command, DisposeCommand};
use crate::config::JdwpConfig;
use crate::engine::{ConnectionState, JdwpEngine};
use crate::protocol::JdwpResult;
use crate::types::{ClassData, VmVersion};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct JdwpConnection {
    engine: JdwpEngine,
    config: JdwpConfig,
    version: Option<VmVersion>,
    classes: Vec<ClassData>,
}

impl JdwpConnection {
    /// Connect to a JVM via JDWP
    pub async fn connect(host: &str, port: u16) -> JdwpResult<Self> {
        Self::connect_with_config(host, port, JdwpConfig::default()).await
    }

    pub async fn connect_with_config(host: &str, port: u16, config: JdwpConfig) -> JdwpResult<Self> {
        let engine = JdwpEngine::attach(host, port, &config).await?;
        Ok(Self::from_engine(engine, config))
    }

    /// Attach over an already connected stream (tunnels, tests)
    pub async fn from_stream<S>(stream: S, config: JdwpConfig) -> JdwpResult<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let engine = JdwpEngine::attach_stream(stream, &config).await?;
        Ok(Self::from_engine(engine, config))
    }

    fn from_engine(engine: JdwpEngine, config: JdwpConfig) -> Self {
        Self {
            engine,
            config,
            version: None,
            classes: Vec::new(),
        }
    }

    /// Negotiate ID sizes, then fetch the VM version and loaded classes
    pub async fn initialize(&mut self) -> JdwpResult<()> {
        let id_sizes = self.get_id_sizes().await?;
        self.engine.set_id_sizes(id_sizes)?;

        let version = self.get_version().await?;
        info!(
            "Attached to {} {} (JDWP {}.{})",
            version.vm_name, version.vm_version, version.jdwp_major, version.jdwp_minor
        );
        self.version = Some(version);

        self.classes = self.all_classes_with_generic().await?;
        info!("VM reports {} loaded classes", self.classes.len());

        Ok(())
    }

    /// Send a command and wait for reply
    pub async fn send_command<C: Command>(&self, command: C) -> JdwpResult<C::Reply> {
        self.engine.send_command(command).await
    }

    pub fn engine(&self) -> &JdwpEngine {
        &self.engine
    }

    pub fn config(&self) -> &JdwpConfig {
        &self.config
    }

    /// Version cached by [`Self::initialize`]
    pub fn version(&self) -> Option<&VmVersion> {
        self.version.as_ref()
    }

    /// Classes cached by [`Self::initialize`]
    pub fn classes(&self) -> &[ClassData] {
        &self.classes
    }

    pub fn state(&self) -> ConnectionState {
        self.engine.state()
    }

    /// Detach: best-effort Dispose within the teardown budget, then close.
    /// Errors on the way out are logged and swallowed.
    pub async fn close(self) {
        if self.engine.state() == ConnectionState::Ready {
            match tokio::time::timeout(self.config.teardown_timeout, self.dispose()).await {
                Ok(Ok(())) => debug!("VM acknowledged Dispose"),
                Ok(Err(e)) => debug!("Dispose failed during teardown: {}", e),
                Err(_) => warn!(
                    "Dispose not acknowledged within {:?}",
                    self.config.teardown_timeout
                ),
            }
        }

        self.engine.close().await;
        info!("JDWP session closed");
    }

    /// VirtualMachine.Dispose
    pub async fn dispose(&self) -> JdwpResult<()> {
        self.send_command(DisposeCommand).await
    }
}
