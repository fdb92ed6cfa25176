//! Startup-time engine configuration shared by the world and the tick loop.

use std::sync::Arc;

use crate::error::ScheduleError;
use crate::schedule::builtin::{ProcessTickTask, ReapTask};
use crate::schedule::group::{SchedulerGroups, CLEANUP, PROGRAM};
use crate::schedule::template::{TaskCatalog, TaskTemplate, TaskTemplates};
use crate::task::executor::ProgramRegistry;
use crate::world::COMPUTER;

/// Groups, task templates, programs and the task catalog.
///
/// Built once before the engine starts, then shared read-only behind an `Arc`.
#[derive(Debug, Default)]
pub struct EngineContext {
    groups: SchedulerGroups,
    templates: TaskTemplates,
    programs: Arc<ProgramRegistry>,
    catalog: TaskCatalog,
}

impl EngineContext {
    pub fn new(groups: SchedulerGroups) -> Self {
        Self { groups, ..Self::default() }
    }

    /// Default groups with process ticking and reaping installed on computers.
    pub fn with_defaults() -> Self {
        let mut context = Self::new(SchedulerGroups::with_defaults());
        // Both groups exist in the defaults.
        let _ = context.install_process_tasks(PROGRAM, CLEANUP);
        context
    }

    pub fn with_programs(mut self, programs: ProgramRegistry) -> Self {
        self.programs = Arc::new(programs);
        self
    }

    pub fn groups(&self) -> &SchedulerGroups {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut SchedulerGroups {
        &mut self.groups
    }

    pub fn templates(&self) -> &TaskTemplates {
        &self.templates
    }

    pub fn programs(&self) -> &Arc<ProgramRegistry> {
        &self.programs
    }

    pub fn catalog(&self) -> &TaskCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut TaskCatalog {
        &mut self.catalog
    }

    /// Adds a template for owners of `owner_kind`. The group must be registered
    /// and the delay positive.
    pub fn register_template(
        &mut self,
        owner_kind: impl Into<String>,
        template: TaskTemplate,
    ) -> Result<(), ScheduleError> {
        if !self.groups.contains(template.group()) {
            return Err(ScheduleError::UnknownGroup(template.group().to_string()));
        }
        if template.delay() == 0 {
            return Err(ScheduleError::ZeroDelay);
        }
        if template.period() == Some(0) {
            return Err(ScheduleError::ZeroPeriod);
        }
        self.templates.register(owner_kind, template);
        Ok(())
    }

    /// Every computer ticks its processes in `tick_group` and reaps them in
    /// `reap_group`, once per tick.
    pub fn install_process_tasks(&mut self, tick_group: &str, reap_group: &str) -> Result<(), ScheduleError> {
        self.register_template(COMPUTER, TaskTemplate::new(tick_group, 1, || Box::new(ProcessTickTask)).every(1))?;
        self.register_template(COMPUTER, TaskTemplate::new(reap_group, 1, || Box::new(ReapTask)).every(1))?;
        self.catalog.register(ProcessTickTask::KIND, |_| Ok(Box::new(ProcessTickTask)));
        self.catalog.register(ReapTask::KIND, |_| Ok(Box::new(ReapTask)));
        Ok(())
    }
}
