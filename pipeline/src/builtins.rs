//! Built-in pipeline registrations

use crate::caption::CaptionPipeline;
use crate::error::Result;
use crate::factory::{constructor, Constructor, PipelineFactory};
use crate::labels::LabelsPipeline;
use crate::nop::NopPipeline;
use crate::rag::RagPipeline;
use crate::segmentation::SegmentationPipeline;
use crate::summary::SummaryPipeline;
use crate::tensors::TensorsPipeline;
use crate::text_generation::TextGenerationPipeline;
use crate::tokenizer::TokenizerPipeline;
use crate::trainer::TrainerPipeline;
use crate::transcription::TranscriptionPipeline;
use crate::translation::TranslationPipeline;
use crate::types::PipelineType;

/// Constructor for a built-in type
pub fn builtin_constructor(pipeline_type: PipelineType) -> Constructor {
    match pipeline_type {
        PipelineType::Nop => constructor(NopPipeline::from_spec),
        PipelineType::Segmentation => constructor(SegmentationPipeline::from_spec),
        PipelineType::Tokenizer => constructor(TokenizerPipeline::from_spec),
        PipelineType::Tensors => constructor(TensorsPipeline::from_spec),
        PipelineType::Transcription => constructor(TranscriptionPipeline::from_spec),
        PipelineType::TextGeneration => constructor(TextGenerationPipeline::from_spec),
        PipelineType::Rag => constructor(RagPipeline::from_spec),
        PipelineType::Caption => constructor(CaptionPipeline::from_spec),
        PipelineType::Summary => constructor(SummaryPipeline::from_spec),
        PipelineType::Translation => constructor(TranslationPipeline::from_spec),
        PipelineType::Labels => constructor(LabelsPipeline::from_spec),
        PipelineType::Trainer => constructor(TrainerPipeline::from_spec),
    }
}

/// Register every built-in type and its aliases
pub fn register_builtins(factory: &PipelineFactory) -> Result<()> {
    for pipeline_type in PipelineType::ALL {
        factory.register(pipeline_type.as_str(), builtin_constructor(pipeline_type))?;
        for alias in pipeline_type.aliases() {
            factory.register_alias(*alias, pipeline_type.as_str())?;
        }
    }
    log::info!("Registered {} built-in pipeline types", PipelineType::ALL.len());
    Ok(())
}
