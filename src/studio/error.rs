use crate::llm::SynthesisError;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StudioError {
    #[error("IDENTITY REQUIRED: Please upload the source face.")]
    MissingIdentity,
    #[error("OUTFIT REQUIRED: Please provide a garment reference.")]
    MissingOutfit,
    #[error("A generation is already in progress. Wait for it to finish.")]
    GenerationInFlight,
    #[error("Generate a first image before asking for a variation.")]
    NoResults,
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}
