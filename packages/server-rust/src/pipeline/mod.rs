//! Task pipeline: ordered stages over a typed per-request context.
//!
//! Every request owns one context value. Stages run in declaration order,
//! each reading fields earlier stages wrote and writing fields for later
//! ones. Field wiring is checked when the pipeline is built: a stage that
//! reads a field nobody produced, or writes a field someone else already
//! produces, is rejected by [`PipelineBuilder::finish_with`].
//!
//! The first error recorded on a context sticks. Once one is recorded the
//! remaining stages are skipped and only the finalizer runs, so a response
//! is always produced.

pub mod slot;

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

use async_trait::async_trait;
use mep_core::ErrorCode;
use tracing::{debug, warn};

pub use slot::{Slot, SlotError};

// ---------------------------------------------------------------------------
// Errors and stage results
// ---------------------------------------------------------------------------

/// Error code plus human-readable message recorded by a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskError {
    pub code: ErrorCode,
    pub message: String,
}

impl TaskError {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<SlotError> for TaskError {
    fn from(err: SlotError) -> Self {
        Self::new(ErrorCode::FailBase, err.to_string())
    }
}

/// Result of running one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskCode {
    /// Run the next stage.
    Continue,
    /// Skip the remaining stages without recording an error.
    Stop,
    /// Stop here, recording the error unless one is already recorded.
    Finish(TaskError),
}

/// Holder for the first error recorded during a request.
#[derive(Debug, Default)]
pub struct FirstError(Option<TaskError>);

impl FirstError {
    /// Records `err` if nothing was recorded yet. Returns whether it was kept.
    pub fn record(&mut self, err: TaskError) -> bool {
        if self.0.is_some() {
            debug!(code = ?err.code, message = %err.message, "later error dropped");
            return false;
        }
        self.0 = Some(err);
        true
    }

    #[must_use]
    pub fn get(&self) -> Option<&TaskError> {
        self.0.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Context and stage traits
// ---------------------------------------------------------------------------

/// Per-request state threaded through a pipeline.
pub trait PipelineContext: Send + 'static {
    /// Names of the context's fields, used for wiring checks.
    type Field: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// Fields populated before the first stage runs.
    fn seeded() -> &'static [Self::Field];

    fn errors(&mut self) -> &mut FirstError;

    fn first_error(&self) -> Option<&TaskError>;
}

/// One unit of request processing.
#[async_trait]
pub trait Task<C: PipelineContext>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fields this stage reads.
    fn inputs(&self) -> &'static [C::Field];

    /// Fields this stage writes.
    fn outputs(&self) -> &'static [C::Field];

    async fn on_request(&self, ctx: &mut C) -> TaskCode;
}

/// Wiring error detected while building a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("stage `{stage}` reads `{field}` before any stage writes it")]
    MissingInput { stage: &'static str, field: String },
    #[error("stage `{stage}` writes `{field}`, which is already written")]
    DuplicateOutput { stage: &'static str, field: String },
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A validated stage sequence with a mandatory finalizer.
pub struct Pipeline<C: PipelineContext> {
    name: &'static str,
    stages: Vec<Box<dyn Task<C>>>,
    finalizer: Box<dyn Task<C>>,
}

impl<C: PipelineContext> Pipeline<C> {
    #[must_use]
    pub fn builder(name: &'static str) -> PipelineBuilder<C> {
        PipelineBuilder {
            name,
            stages: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stage names in execution order, finalizer last.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages
            .iter()
            .map(|s| s.name())
            .chain(std::iter::once(self.finalizer.name()))
            .collect()
    }

    /// Runs every stage against `ctx` and returns it.
    pub async fn run(&self, mut ctx: C) -> C {
        for stage in &self.stages {
            match stage.on_request(&mut ctx).await {
                TaskCode::Continue => {}
                TaskCode::Stop => {
                    debug!(pipeline = self.name, stage = stage.name(), "stage stopped pipeline");
                    break;
                }
                TaskCode::Finish(err) => {
                    warn!(
                        pipeline = self.name,
                        stage = stage.name(),
                        code = ?err.code,
                        message = %err.message,
                        "stage finished with error"
                    );
                    ctx.errors().record(err);
                }
            }
            if ctx.first_error().is_some() {
                break;
            }
        }

        if let TaskCode::Finish(err) = self.finalizer.on_request(&mut ctx).await {
            warn!(
                pipeline = self.name,
                stage = self.finalizer.name(),
                code = ?err.code,
                message = %err.message,
                "finalizer finished with error"
            );
            ctx.errors().record(err);
        }
        ctx
    }
}

/// Collects stages; [`PipelineBuilder::finish_with`] validates the wiring.
pub struct PipelineBuilder<C: PipelineContext> {
    name: &'static str,
    stages: Vec<Box<dyn Task<C>>>,
}

impl<C: PipelineContext> PipelineBuilder<C> {
    #[must_use]
    pub fn stage(mut self, task: impl Task<C> + 'static) -> Self {
        self.stages.push(Box::new(task));
        self
    }

    /// Adds the always-run finalizer and checks field wiring.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a stage reads an unwritten field or
    /// writes a field that is already written.
    pub fn finish_with(
        self,
        finalizer: impl Task<C> + 'static,
    ) -> Result<Pipeline<C>, PipelineError> {
        let finalizer: Box<dyn Task<C>> = Box::new(finalizer);
        let mut written: HashSet<C::Field> = C::seeded().iter().copied().collect();

        for stage in self.stages.iter().chain(std::iter::once(&finalizer)) {
            for field in stage.inputs() {
                if !written.contains(field) {
                    return Err(PipelineError::MissingInput {
                        stage: stage.name(),
                        field: format!("{field:?}"),
                    });
                }
            }
            for field in stage.outputs() {
                if !written.insert(*field) {
                    return Err(PipelineError::DuplicateOutput {
                        stage: stage.name(),
                        field: format!("{field:?}"),
                    });
                }
            }
        }

        Ok(Pipeline {
            name: self.name,
            stages: self.stages,
            finalizer,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Field {
        Input,
        Middle,
        Output,
    }

    #[derive(Default)]
    struct TestCtx {
        log: Vec<&'static str>,
        middle: Option<u32>,
        errors: FirstError,
    }

    impl PipelineContext for TestCtx {
        type Field = Field;

        fn seeded() -> &'static [Field] {
            &[Field::Input]
        }

        fn errors(&mut self) -> &mut FirstError {
            &mut self.errors
        }

        fn first_error(&self) -> Option<&TaskError> {
            self.errors.get()
        }
    }

    /// Stage that logs its name and optionally fails or stops.
    struct Step {
        name: &'static str,
        inputs: &'static [Field],
        outputs: &'static [Field],
        fail_with: Option<TaskError>,
        stop: bool,
    }

    impl Step {
        fn ok(name: &'static str, inputs: &'static [Field], outputs: &'static [Field]) -> Self {
            Self {
                name,
                inputs,
                outputs,
                fail_with: None,
                stop: false,
            }
        }

        fn stopping(name: &'static str) -> Self {
            Self {
                stop: true,
                ..Self::ok(name, &[], &[])
            }
        }

        fn failing(name: &'static str, err: TaskError) -> Self {
            Self {
                fail_with: Some(err),
                ..Self::ok(name, &[], &[])
            }
        }
    }

    #[async_trait]
    impl Task<TestCtx> for Step {
        fn name(&self) -> &'static str {
            self.name
        }

        fn inputs(&self) -> &'static [Field] {
            self.inputs
        }

        fn outputs(&self) -> &'static [Field] {
            self.outputs
        }

        async fn on_request(&self, ctx: &mut TestCtx) -> TaskCode {
            ctx.log.push(self.name);
            if self.outputs.contains(&Field::Middle) {
                ctx.middle = Some(7);
            }
            match &self.fail_with {
                Some(err) => TaskCode::Finish(err.clone()),
                None if self.stop => TaskCode::Stop,
                None => TaskCode::Continue,
            }
        }
    }

    fn not_found(msg: &str) -> TaskError {
        TaskError::new(ErrorCode::ServiceNotFound, msg)
    }

    #[test]
    fn missing_input_is_rejected_at_build_time() {
        let err = Pipeline::<TestCtx>::builder("t")
            .stage(Step::ok("reads-middle", &[Field::Middle], &[]))
            .finish_with(Step::ok("final", &[], &[]))
            .err()
            .unwrap();
        assert_eq!(
            err,
            PipelineError::MissingInput {
                stage: "reads-middle",
                field: "Middle".to_string()
            }
        );
    }

    #[test]
    fn duplicate_output_is_rejected_at_build_time() {
        let err = Pipeline::<TestCtx>::builder("t")
            .stage(Step::ok("a", &[Field::Input], &[Field::Middle]))
            .stage(Step::ok("b", &[], &[Field::Middle]))
            .finish_with(Step::ok("final", &[], &[]))
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::DuplicateOutput { stage: "b", .. }));

        let err = Pipeline::<TestCtx>::builder("t")
            .finish_with(Step::ok("final", &[], &[Field::Input]))
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::DuplicateOutput { stage: "final", .. }));
    }

    #[tokio::test]
    async fn all_stages_run_in_order() {
        let pipeline = Pipeline::<TestCtx>::builder("t")
            .stage(Step::ok("decode", &[Field::Input], &[Field::Middle]))
            .stage(Step::ok("dispatch", &[Field::Middle], &[]))
            .finish_with(Step::ok("encode", &[Field::Middle], &[Field::Output]))
            .unwrap();

        assert_eq!(pipeline.stage_names(), vec!["decode", "dispatch", "encode"]);
        let ctx = pipeline.run(TestCtx::default()).await;
        assert_eq!(ctx.log, vec!["decode", "dispatch", "encode"]);
        assert_eq!(ctx.middle, Some(7));
        assert!(ctx.first_error().is_none());
    }

    #[tokio::test]
    async fn first_error_wins_and_skips_to_finalizer() {
        let pipeline = Pipeline::<TestCtx>::builder("t")
            .stage(Step::failing("stage1", not_found("A")))
            .stage(Step::ok("stage2", &[], &[]))
            .stage(Step::failing("stage3", not_found("B")))
            .finish_with(Step::failing(
                "encode",
                TaskError::new(ErrorCode::FailBase, "C"),
            ))
            .unwrap();

        let ctx = pipeline.run(TestCtx::default()).await;
        assert_eq!(ctx.log, vec!["stage1", "encode"]);
        assert_eq!(ctx.first_error(), Some(&not_found("A")));
    }

    #[tokio::test]
    async fn stop_skips_to_finalizer_without_error() {
        let pipeline = Pipeline::<TestCtx>::builder("t")
            .stage(Step::ok("decode", &[], &[]))
            .stage(Step::stopping("transcode"))
            .stage(Step::ok("hook", &[], &[]))
            .finish_with(Step::ok("encode", &[], &[]))
            .unwrap();

        let ctx = pipeline.run(TestCtx::default()).await;
        assert_eq!(ctx.log, vec!["decode", "transcode", "encode"]);
        assert!(ctx.first_error().is_none());
    }

    /// Stage that records an error on the context but still returns `Continue`.
    struct RecordsDirectly;

    #[async_trait]
    impl Task<TestCtx> for RecordsDirectly {
        fn name(&self) -> &'static str {
            "records"
        }

        fn inputs(&self) -> &'static [Field] {
            &[]
        }

        fn outputs(&self) -> &'static [Field] {
            &[]
        }

        async fn on_request(&self, ctx: &mut TestCtx) -> TaskCode {
            ctx.log.push("records");
            ctx.errors().record(not_found("direct"));
            TaskCode::Continue
        }
    }

    #[tokio::test]
    async fn recorded_error_also_stops_the_pipeline() {
        let pipeline = Pipeline::<TestCtx>::builder("t")
            .stage(RecordsDirectly)
            .stage(Step::ok("skipped", &[], &[]))
            .finish_with(Step::ok("encode", &[], &[]))
            .unwrap();

        let ctx = pipeline.run(TestCtx::default()).await;
        assert_eq!(ctx.log, vec!["records", "encode"]);
        assert_eq!(ctx.first_error().unwrap().message, "direct");
    }

    #[test]
    fn first_error_record_keeps_earliest() {
        let mut errors = FirstError::default();
        assert!(errors.record(not_found("A")));
        assert!(!errors.record(not_found("B")));
        assert_eq!(errors.get().unwrap().message, "A");
    }

    #[test]
    fn slot_error_maps_to_fail_base() {
        let err: TaskError = SlotError::AlreadyWritten { field: "coreRsp" }.into();
        assert_eq!(err.code, ErrorCode::FailBase);
        assert!(err.message.contains("coreRsp"));
    }
}
