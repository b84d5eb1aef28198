pub mod ports;
pub mod run_pipeline_use_case;

pub use run_pipeline_use_case::RunPipelineUseCase;
