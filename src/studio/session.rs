use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{info, warn};

use crate::llm::{SynthesisError, SynthesisRequest, SynthesizedImage};
use crate::studio::catalog::Catalog;
use crate::studio::error::StudioError;
use crate::studio::prompt::compose_prompt;
use crate::studio::selection::{ImageSlot, Selection};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GenerationState {
    #[default]
    Idle,
    Pending,
    Succeeded,
    Failed(String),
}

impl GenerationState {
    pub fn is_pending(&self) -> bool {
        matches!(self, GenerationState::Pending)
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            GenerationState::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GenerationState::Idle => "idle",
            GenerationState::Pending => "pending",
            GenerationState::Succeeded => "succeeded",
            GenerationState::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    id: i64,
    image: SynthesizedImage,
    prompt: String,
    created_at: DateTime<Utc>,
}

impl GenerationResult {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn image(&self) -> &SynthesizedImage {
        &self.image
    }

    /// The exact instruction that was sent for this image.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn export_file_name(&self) -> String {
        format!("influencer-{}.{}", self.id, self.image.file_extension())
    }
}

/// A dispatched-but-unfinished generation. Produced by `begin_*`, consumed by
/// [`StudioSession::complete`], so callers can release any lock across the await.
#[derive(Debug, Clone)]
pub struct PendingGeneration {
    pub request: SynthesisRequest,
    pub variation: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StudioSession {
    catalog: Arc<Catalog>,
    selection: Selection,
    results: Vec<GenerationResult>,
    state: GenerationState,
    last_result_id: i64,
}

impl StudioSession {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        let selection = Selection::new(&catalog);
        Self {
            catalog,
            selection,
            results: Vec::new(),
            state: GenerationState::Idle,
            last_result_id: 0,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    /// Newest first.
    pub fn results(&self) -> &[GenerationResult] {
        &self.results
    }

    pub fn result(&self, id: i64) -> Option<&GenerationResult> {
        self.results.iter().find(|result| result.id == id)
    }

    pub fn can_generate_variation(&self) -> bool {
        !self.results.is_empty() && !self.state.is_pending()
    }

    pub fn begin_submit(&mut self) -> Result<PendingGeneration, StudioError> {
        self.begin(None)
    }

    pub fn begin_variation<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<PendingGeneration, StudioError> {
        if self.state.is_pending() {
            return Err(StudioError::GenerationInFlight);
        }
        if self.results.is_empty() {
            return Err(StudioError::NoResults);
        }
        let modifier = self.catalog.variation_modifiers().choose(rng).cloned();
        self.begin(modifier)
    }

    fn begin(&mut self, variation: Option<String>) -> Result<PendingGeneration, StudioError> {
        if self.state.is_pending() {
            return Err(StudioError::GenerationInFlight);
        }

        let (identity, outfit) = match self.selection.validate() {
            Ok((identity, outfit)) => (identity.clone(), outfit.clone()),
            Err(err) => {
                self.state = GenerationState::Failed(err.to_string());
                return Err(err);
            }
        };

        let prompt = compose_prompt(&self.selection, variation.as_deref());
        let request = SynthesisRequest {
            identity,
            outfit,
            product: self.selection.image(ImageSlot::Product).cloned(),
            aspect_ratio: self.selection.aspect_ratio(),
            prompt,
        };
        self.state = GenerationState::Pending;
        info!(
            aspect_ratio = request.aspect_ratio.as_str(),
            images = request.images().count(),
            variation = variation.as_deref().unwrap_or(""),
            "Generation dispatched"
        );

        Ok(PendingGeneration { request, variation })
    }

    /// Applies the outcome of a dispatched generation. Successful results are
    /// prepended; failures leave the result list untouched.
    pub fn complete(
        &mut self,
        pending: PendingGeneration,
        outcome: Result<SynthesizedImage, SynthesisError>,
        now: DateTime<Utc>,
    ) -> Result<GenerationResult, StudioError> {
        if !self.state.is_pending() {
            warn!(
                state = self.state.label(),
                "Generation finished while no request was pending"
            );
        }

        match outcome {
            Ok(image) => {
                let result = GenerationResult {
                    id: self.next_result_id(now),
                    image,
                    prompt: pending.request.prompt,
                    created_at: now,
                };
                self.results.insert(0, result.clone());
                self.state = GenerationState::Succeeded;
                info!(result_id = result.id, total = self.results.len(), "Generation succeeded");
                Ok(result)
            }
            Err(err) => {
                warn!("Generation failed: {}", err);
                self.state = GenerationState::Failed(err.to_string());
                Err(StudioError::Synthesis(err))
            }
        }
    }

    pub fn remove_result(&mut self, id: i64) -> bool {
        let before = self.results.len();
        self.results.retain(|result| result.id != id);
        self.results.len() != before
    }

    // Ids come from the creation time but must stay unique within a session.
    fn next_result_id(&mut self, now: DateTime<Utc>) -> i64 {
        let candidate = now.timestamp_millis();
        let id = if candidate <= self.last_result_id {
            self.last_result_id + 1
        } else {
            candidate
        };
        self.last_result_id = id;
        id
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::llm::ImageSynthesizer;
    use crate::studio::selection::ImageAsset;

    struct FakeSynthesizer {
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
        outcome: Result<SynthesizedImage, SynthesisError>,
    }

    impl FakeSynthesizer {
        fn succeeding() -> Self {
            Self::with(Ok(SynthesizedImage::new(b"png-bytes".to_vec(), "image/png")))
        }

        fn failing(message: &str) -> Self {
            Self::with(Err(SynthesisError::Service(message.to_string())))
        }

        fn with(outcome: Result<SynthesizedImage, SynthesisError>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                outcome,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageSynthesizer for FakeSynthesizer {
        async fn synthesize(
            &self,
            request: &SynthesisRequest,
        ) -> Result<SynthesizedImage, SynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().push(request.prompt.clone());
            self.outcome.clone()
        }
    }

    fn session() -> StudioSession {
        StudioSession::new(Arc::new(Catalog::builtin()))
    }

    fn ready_session() -> StudioSession {
        let mut session = session();
        let selection = session.selection_mut();
        selection.set_image(ImageSlot::Identity, ImageAsset::from_bytes(vec![1]).unwrap());
        selection.set_image(ImageSlot::Outfit, ImageAsset::from_bytes(vec![2]).unwrap());
        session
    }

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    // Same begin/await/complete sequence the chat handler runs.
    async fn run(
        session: &mut StudioSession,
        synth: &FakeSynthesizer,
        begun: Result<PendingGeneration, StudioError>,
    ) -> Result<GenerationResult, StudioError> {
        let pending = begun?;
        let outcome = synth.synthesize(&pending.request).await;
        session.complete(pending, outcome, Utc::now())
    }

    async fn submit(
        session: &mut StudioSession,
        synth: &FakeSynthesizer,
    ) -> Result<GenerationResult, StudioError> {
        let begun = session.begin_submit();
        run(session, synth, begun).await
    }

    async fn vary(
        session: &mut StudioSession,
        synth: &FakeSynthesizer,
        rng: &mut StdRng,
    ) -> Result<GenerationResult, StudioError> {
        let begun = session.begin_variation(rng);
        run(session, synth, begun).await
    }

    #[tokio::test]
    async fn missing_identity_fails_without_outbound_call() {
        let synth = FakeSynthesizer::succeeding();
        let mut session = session();
        session
            .selection_mut()
            .set_image(ImageSlot::Outfit, ImageAsset::from_bytes(vec![2]).unwrap());

        let err = submit(&mut session, &synth).await.unwrap_err();
        assert_eq!(err, StudioError::MissingIdentity);
        assert_eq!(
            session.state().error_message(),
            Some("IDENTITY REQUIRED: Please upload the source face.")
        );
        assert_eq!(synth.calls(), 0);
    }

    #[tokio::test]
    async fn missing_outfit_has_its_own_message() {
        let synth = FakeSynthesizer::succeeding();
        let mut session = session();
        session
            .selection_mut()
            .set_image(ImageSlot::Identity, ImageAsset::from_bytes(vec![1]).unwrap());

        let err = submit(&mut session, &synth).await.unwrap_err();
        assert_eq!(err, StudioError::MissingOutfit);
        assert_eq!(
            session.state(),
            &GenerationState::Failed("OUTFIT REQUIRED: Please provide a garment reference.".into())
        );
        assert_eq!(synth.calls(), 0);
    }

    #[tokio::test]
    async fn service_failure_keeps_results_and_propagates_message() {
        let mut session = ready_session();
        submit(&mut session, &FakeSynthesizer::succeeding()).await.unwrap();

        let failing = FakeSynthesizer::failing("quota exceeded");
        let err = submit(&mut session, &failing).await.unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");
        assert_eq!(session.state().error_message(), Some("quota exceeded"));
        assert_eq!(session.results().len(), 1);
        assert_eq!(failing.calls(), 1);
    }

    #[tokio::test]
    async fn empty_result_is_reported() {
        let mut session = ready_session();
        let synth = FakeSynthesizer::with(Err(SynthesisError::EmptyResult));
        let err = submit(&mut session, &synth).await.unwrap_err();
        assert_eq!(err, StudioError::Synthesis(SynthesisError::EmptyResult));
        assert_eq!(session.state().error_message(), Some("Synthesis produced no image."));
    }

    #[tokio::test]
    async fn success_prepends_result_with_sent_prompt() {
        let synth = FakeSynthesizer::succeeding();
        let mut session = ready_session();
        session.selection_mut().set_directive("first");
        let first = submit(&mut session, &synth).await.unwrap();
        session.selection_mut().set_directive("second");
        let second = submit(&mut session, &synth).await.unwrap();

        assert_eq!(session.state(), &GenerationState::Succeeded);
        assert_eq!(session.results().len(), 2);
        assert_eq!(session.results()[0].id(), second.id());
        assert_eq!(session.results()[1].id(), first.id());
        let sent = synth.prompts.lock().clone();
        assert_eq!(session.results()[0].prompt(), sent[1]);
        assert_eq!(session.results()[1].prompt(), sent[0]);
    }

    #[test]
    fn begin_while_pending_is_rejected() {
        let mut session = ready_session();
        let pending = session.begin_submit().unwrap();
        assert!(session.state().is_pending());

        assert_eq!(session.begin_submit().unwrap_err(), StudioError::GenerationInFlight);
        assert!(session.state().is_pending());

        session
            .complete(pending, Ok(SynthesizedImage::new(vec![9], "image/png")), at(1_000))
            .unwrap();
        assert_eq!(session.results().len(), 1);
    }

    #[test]
    fn next_submit_clears_previous_error() {
        let mut session = session();
        assert!(session.begin_submit().is_err());
        assert!(session.state().error_message().is_some());

        let selection = session.selection_mut();
        selection.set_image(ImageSlot::Identity, ImageAsset::from_bytes(vec![1]).unwrap());
        selection.set_image(ImageSlot::Outfit, ImageAsset::from_bytes(vec![2]).unwrap());
        session.begin_submit().unwrap();
        assert_eq!(session.state(), &GenerationState::Pending);
    }

    #[test]
    fn ids_follow_creation_time_and_stay_unique() {
        let mut session = ready_session();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let pending = session.begin_submit().unwrap();
            let result = session
                .complete(pending, Ok(SynthesizedImage::new(vec![1], "image/png")), at(5_000))
                .unwrap();
            ids.push(result.id());
        }
        assert_eq!(ids, vec![5_000, 5_001, 5_002]);
        assert_eq!(
            session.result(5_001).map(|r| r.export_file_name()),
            Some("influencer-5001.png".to_string())
        );
        assert_eq!(session.result(5_000).unwrap().created_at(), at(5_000));
    }

    #[test]
    fn remove_result_only_drops_the_matching_entry() {
        let mut session = ready_session();
        for millis in [10, 20, 30, 40] {
            let pending = session.begin_submit().unwrap();
            session
                .complete(pending, Ok(SynthesizedImage::new(vec![1], "image/png")), at(millis))
                .unwrap();
        }

        assert!(session.remove_result(20));
        let ids: Vec<i64> = session.results().iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![40, 30, 10]);
        assert!(!session.remove_result(20));
        assert_eq!(session.results().len(), 3);
    }

    #[tokio::test]
    async fn variation_requires_a_prior_result() {
        let synth = FakeSynthesizer::succeeding();
        let mut session = ready_session();
        let mut rng = StdRng::seed_from_u64(7);

        assert!(!session.can_generate_variation());
        let err = vary(&mut session, &synth, &mut rng).await.unwrap_err();
        assert_eq!(err, StudioError::NoResults);
        assert_eq!(synth.calls(), 0);
        assert_eq!(session.state(), &GenerationState::Idle);
    }

    #[tokio::test]
    async fn variation_appends_a_catalog_modifier() {
        let synth = FakeSynthesizer::succeeding();
        let mut session = ready_session();
        session.selection_mut().set_directive("sunset rooftop");
        submit(&mut session, &synth).await.unwrap();
        assert!(session.can_generate_variation());

        let mut rng = StdRng::seed_from_u64(42);
        let varied = vary(&mut session, &synth, &mut rng).await.unwrap();

        let modifier = session
            .catalog()
            .variation_modifiers()
            .iter()
            .find(|modifier| varied.prompt().contains(&format!("Variation: {modifier}")))
            .cloned()
            .expect("prompt should carry a catalog modifier");
        let base = compose_prompt(session.selection(), None);
        assert_eq!(
            varied.prompt().replace(&format!("Variation: {modifier}. "), ""),
            base
        );
        assert_eq!(session.results().len(), 2);
    }

    #[test]
    fn variation_is_blocked_while_pending() {
        let mut session = ready_session();
        let pending = session.begin_submit().unwrap();
        session
            .complete(pending, Ok(SynthesizedImage::new(vec![1], "image/png")), at(1))
            .unwrap();
        let _in_flight = session.begin_submit().unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        assert!(!session.can_generate_variation());
        assert_eq!(
            session.begin_variation(&mut rng).unwrap_err(),
            StudioError::GenerationInFlight
        );
    }

    #[test]
    fn product_image_is_forwarded_when_present() {
        let mut session = ready_session();
        session
            .selection_mut()
            .set_image(ImageSlot::Product, ImageAsset::from_bytes(vec![3]).unwrap());
        let pending = session.begin_submit().unwrap();
        let bytes: Vec<&[u8]> = pending.request.images().map(|image| image.bytes()).collect();
        assert_eq!(bytes, vec![[1u8].as_slice(), [2u8].as_slice(), [3u8].as_slice()]);
        assert!(pending.variation.is_none());
    }
}
