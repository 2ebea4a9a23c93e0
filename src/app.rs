//! Application entry - resolves a name to a script or group and runs it

use crate::command::CommandAssembler;
use crate::config::{Catalog, Target};
use crate::core::{
    Coordinator, FilesystemEventSource, NativeHost, NotifySource, ProcessHost, Supervisor,
};
use crate::error::ConfigError;
use crate::report::Reporter;
use anyhow::Result;

/// Application state
pub struct App<H = NativeHost, S = NotifySource> {
    catalog: Catalog,
    supervisor: Supervisor<H, S>,
    coordinator: Coordinator<H, S>,
}

impl App {
    /// Create an app running real processes. `debug` adds to `settings.debug`.
    pub fn new(catalog: Catalog, debug: bool) -> Self {
        Self::with_parts(catalog, NativeHost, NotifySource, debug)
    }
}

impl<H, S> App<H, S>
where
    H: ProcessHost,
    S: FilesystemEventSource + Send + Sync + 'static,
{
    pub fn with_parts(catalog: Catalog, host: H, source: S, debug: bool) -> Self {
        let reporter = Reporter::new(debug || catalog.global.debug);
        let formatter = CommandAssembler::new(&catalog.global).formatter();

        let supervisor = Supervisor::with_source(host, source, reporter).with_formatter(formatter);
        let coordinator = Coordinator::new(supervisor.clone());

        Self {
            catalog,
            supervisor,
            coordinator,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Run a script or group by name and return the process exit code
    pub async fn execute(&self, name: &str, trailing: &[String]) -> Result<i32> {
        let assembler = CommandAssembler::new(&self.catalog.global);

        match self.catalog.lookup(name) {
            None => Err(ConfigError::UnknownScript(name.to_string()).into()),
            Some(Target::Group(group)) => {
                let code = self
                    .coordinator
                    .run_group(name, group, |member| {
                        let script =
                            self.catalog
                                .script(member)
                                .ok_or_else(|| ConfigError::UnknownMember {
                                    group: name.to_string(),
                                    member: member.to_string(),
                                })?;
                        assembler.assemble(member, script, trailing)
                    })
                    .await?;
                Ok(code)
            }
            Some(Target::Script(script)) => {
                let plan = assembler.assemble(name, script, trailing)?;
                self.supervisor.format().await;
                let result = self.supervisor.run(&plan).await?;
                Ok(result.exit_code)
            }
        }
    }
}
