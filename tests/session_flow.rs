//! End-to-end session scenarios over stub gateways.
//!
//! Drives full meeting lifecycles through the coordinator: join, audio
//! chunks, periodic analysis, on-demand summary, end_meeting finalization
//! against a real (temporary) database and index directory.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

use ideastream::db::{self, MeetingRepository, MeetingStatus, TranscriptRepository};
use ideastream::retrieval::{ContextRetriever, RetrievalError, VectorIndex};
use ideastream::session::{Flow, MeetingRegistry, SessionCoordinator, SessionDeps};
use ideastream::synthesis::{
    ArtifactResult, MeetingSummary, PeriodicAnalysis, SynthesisError, SynthesisGateway, TitleBlock,
};
use ideastream::transcription::{TranscriptionError, TranscriptionGateway};

struct FixedTranscriber(&'static str);

#[async_trait]
impl TranscriptionGateway for FixedTranscriber {
    async fn transcribe(&self, _audio_path: &Path) -> Result<String, TranscriptionError> {
        Ok(self.0.to_string())
    }
}

struct CannedSynthesizer;

#[async_trait]
impl SynthesisGateway for CannedSynthesizer {
    async fn analyze(
        &self,
        _transcript: &str,
        _context: &str,
    ) -> Result<ArtifactResult<PeriodicAnalysis>, SynthesisError> {
        Ok(ArtifactResult::Parsed(PeriodicAnalysis {
            titles: vec![TitleBlock {
                title: "Greetings".to_string(),
                ideas: vec!["Say hello".to_string()],
                category: "Social".to_string(),
            }],
            suggestions: vec!["Keep talking".to_string()],
        }))
    }

    async fn summarize(
        &self,
        transcript: &str,
        _context: &str,
    ) -> Result<ArtifactResult<MeetingSummary>, SynthesisError> {
        Ok(ArtifactResult::Parsed(MeetingSummary {
            key_outcomes: vec![],
            decisions_made: vec![],
            action_items: vec![],
            overview: transcript.to_string(),
            important_takeaways: vec![],
        }))
    }
}

struct ConstantEmbedder;

#[async_trait]
impl ideastream::retrieval::Embedder for ConstantEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        // Length-sensitive but deterministic
        Ok(vec![1.0, text.len() as f32 % 7.0, 0.5])
    }
}

struct Fixture {
    deps: Arc<SessionDeps>,
    index: Arc<VectorIndex>,
    meeting_id: String,
    _tmp: tempfile::TempDir,
}

fn fixture(transcript_text: &'static str) -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("ideastream.db");

    let meeting_id = {
        let conn = db::open(&db_path).unwrap();
        MeetingRepository::insert(&conn, Some("Kickoff"), None, Some(60)).unwrap()
    };

    let index = Arc::new(VectorIndex::new(
        tmp.path().join("indices"),
        Arc::new(ConstantEmbedder),
        1000,
        100,
    ));

    let deps = Arc::new(SessionDeps {
        registry: MeetingRegistry::new(),
        transcriber: Arc::new(FixedTranscriber(transcript_text)),
        synthesizer: Arc::new(CannedSynthesizer),
        retriever: index.clone(),
        recordings_dir: tmp.path().join("recordings"),
        db_path,
        top_k: 5,
    });

    Fixture {
        deps,
        index,
        meeting_id,
        _tmp: tmp,
    }
}

fn audio_frame(meeting_id: &str) -> String {
    let pcm = vec![0u8; 3200];
    json!({
        "type": "audio",
        "meetingId": meeting_id,
        "data": BASE64.encode(&pcm),
    })
    .to_string()
}

fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(raw) = rx.try_recv() {
        out.push(serde_json::from_str(&raw).unwrap());
    }
    out
}

#[tokio::test]
async fn full_meeting_lifecycle() {
    let f = fixture("hello world");
    let meeting = f.meeting_id.clone();

    let (tx_ada, mut rx_ada) = mpsc::unbounded_channel();
    let (tx_grace, mut rx_grace) = mpsc::unbounded_channel();

    let mut ada = SessionCoordinator::join(
        f.deps.clone(),
        meeting.clone(),
        "Ada Lovelace".to_string(),
        tx_ada,
    )
    .await;
    let mut grace = SessionCoordinator::join(
        f.deps.clone(),
        meeting.clone(),
        "Grace Hopper".to_string(),
        tx_grace,
    )
    .await;

    // Three chunks from Ada: everyone gets three transcriptions, then an
    // analysis artifact
    for _ in 0..3 {
        assert_eq!(ada.handle_frame(&audio_frame(&meeting)).await, Flow::Continue);
    }

    for rx in [&mut rx_ada, &mut rx_grace] {
        let msgs = drain(rx);
        let transcriptions: Vec<&Value> =
            msgs.iter().filter(|m| m["type"] == "transcription").collect();
        assert_eq!(transcriptions.len(), 3);
        assert_eq!(
            *transcriptions[0],
            json!({"status":"success","type":"transcription","text":"hello world","user":"Ada Lovelace"})
        );

        let analyses: Vec<&Value> = msgs.iter().filter(|m| m["type"] == "analysis").collect();
        assert_eq!(analyses.len(), 1);
        assert_eq!(analyses[0]["output"]["titles"][0]["title"], "Greetings");
    }

    // Grace asks for a summary mid-meeting; both receive it
    let frame = json!({"type":"generate_summary","meetingId":meeting}).to_string();
    grace.handle_frame(&frame).await;
    assert_eq!(drain(&mut rx_ada)[0]["type"], "summary");
    assert_eq!(drain(&mut rx_grace)[0]["type"], "summary");

    // Ada ends the meeting
    let frame = json!({"type":"end_meeting","meetingId":meeting}).to_string();
    assert_eq!(ada.handle_frame(&frame).await, Flow::Finalize);
    ada.finalize().await;
    ada.terminate().await;

    let acks = |msgs: Vec<Value>| {
        msgs.iter()
            .filter(|m| m["type"] == "end_meeting")
            .count()
    };
    assert_eq!(acks(drain(&mut rx_ada)), 1);
    assert_eq!(acks(drain(&mut rx_grace)), 1);

    // Ada's channel is gone; Grace is still registered
    assert!(!f.deps.registry.contains(&meeting, ada.channel_id()).await);
    assert!(f.deps.registry.contains(&meeting, grace.channel_id()).await);

    // Finalization persisted the record and transcript
    let conn = db::open(&f.deps.db_path).unwrap();
    let record = MeetingRepository::get(&conn, &meeting).unwrap().unwrap();
    assert_eq!(record.status, MeetingStatus::Finished);
    let transcripts = TranscriptRepository::for_meeting(&conn, &meeting).unwrap();
    assert_eq!(transcripts, vec!["hello world hello world hello world"]);

    grace.terminate().await;
    assert_eq!(f.deps.registry.member_count(&meeting).await, 0);
}

#[tokio::test]
async fn summary_before_audio_does_not_crash() {
    let f = fixture("unused");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = SessionCoordinator::join(
        f.deps.clone(),
        f.meeting_id.clone(),
        "Ada Lovelace".to_string(),
        tx,
    )
    .await;

    let frame = json!({"type":"generate_summary","meetingId":f.meeting_id}).to_string();
    session.handle_frame(&frame).await;

    let msgs = drain(&mut rx);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0]["type"], "summary");
    assert_eq!(msgs[0]["output"]["overview"], "");

    session.terminate().await;
}

#[tokio::test]
async fn queued_ack_delivered_before_channel_closes() {
    let f = fixture("talk");
    let meeting = f.meeting_id.clone();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = SessionCoordinator::join(
        f.deps.clone(),
        meeting.clone(),
        "Ada Lovelace".to_string(),
        tx,
    )
    .await;

    let frame = json!({"type":"end_meeting","meetingId":meeting}).to_string();
    assert_eq!(session.handle_frame(&frame).await, Flow::Finalize);
    session.finalize().await;
    session.terminate().await;

    // Dropping the coordinator releases the last sender; a writer draining
    // this receiver must still see the queued ack before the channel closes
    drop(session);

    let mut received = Vec::new();
    while let Some(raw) = rx.recv().await {
        received.push(serde_json::from_str::<Value>(&raw).unwrap());
    }
    let acks = received.iter().filter(|m| m["type"] == "end_meeting").count();
    assert_eq!(acks, 1);
}

#[tokio::test]
async fn end_meeting_drops_context_index() {
    let f = fixture("talk");
    let meeting = f.meeting_id.clone();

    // Index a document so the meeting has a persisted index
    f.index.index_document(&meeting, "background notes").await.unwrap();
    assert!(f.index.query(&meeting, "notes", 5).await.is_ok());

    let (tx, _rx) = mpsc::unbounded_channel();
    let mut session = SessionCoordinator::join(
        f.deps.clone(),
        meeting.clone(),
        "Ada Lovelace".to_string(),
        tx,
    )
    .await;

    let frame = json!({"type":"end_meeting","meetingId":meeting}).to_string();
    assert_eq!(session.handle_frame(&frame).await, Flow::Finalize);
    session.finalize().await;
    session.terminate().await;

    let result = f.index.query(&meeting, "notes", 5).await;
    assert!(matches!(result, Err(RetrievalError::IndexNotReady)));
}

#[tokio::test]
async fn retrieved_context_feeds_analysis() {
    // Synthesizer that records the context it was handed
    struct RecordingSynthesizer(std::sync::Mutex<Vec<String>>);

    #[async_trait]
    impl SynthesisGateway for RecordingSynthesizer {
        async fn analyze(
            &self,
            _transcript: &str,
            context: &str,
        ) -> Result<ArtifactResult<PeriodicAnalysis>, SynthesisError> {
            self.0.lock().unwrap().push(context.to_string());
            Ok(ArtifactResult::Invalid)
        }

        async fn summarize(
            &self,
            _transcript: &str,
            _context: &str,
        ) -> Result<ArtifactResult<MeetingSummary>, SynthesisError> {
            Ok(ArtifactResult::Invalid)
        }
    }

    let f = fixture("speech");
    let meeting = f.meeting_id.clone();
    let synthesizer = Arc::new(RecordingSynthesizer(std::sync::Mutex::new(Vec::new())));

    let deps = Arc::new(SessionDeps {
        registry: MeetingRegistry::new(),
        transcriber: Arc::new(FixedTranscriber("speech")),
        synthesizer: synthesizer.clone(),
        retriever: f.index.clone(),
        recordings_dir: f.deps.recordings_dir.clone(),
        db_path: f.deps.db_path.clone(),
        top_k: 5,
    });

    f.index.index_document(&meeting, "project background").await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session =
        SessionCoordinator::join(deps, meeting.clone(), "Ada".to_string(), tx).await;

    for _ in 0..3 {
        session.handle_frame(&audio_frame(&meeting)).await;
    }

    let contexts = synthesizer.0.lock().unwrap().clone();
    assert_eq!(contexts.len(), 1);
    assert!(contexts[0].contains("project background"));

    // Invalid model output still broadcast as the literal error artifact
    let msgs = drain(&mut rx);
    let analysis = msgs.iter().find(|m| m["type"] == "analysis").unwrap();
    assert_eq!(
        analysis["output"],
        json!({"error": "Invalid JSON format in response"})
    );

    session.terminate().await;
}
