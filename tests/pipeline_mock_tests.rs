//! End-to-end pipeline tests with in-process mock providers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use voxway_gateway::core::audio::FRAME_BYTES;
use voxway_gateway::core::events::{MessageRoute, OutgoingEvent};
use voxway_gateway::core::llm::{LanguageModel, LlmError};
use voxway_gateway::core::pipeline::PipelineOrchestrator;
use voxway_gateway::core::session::{ChatMessage, Session, SharedSession, TurnTask};
use voxway_gateway::core::state_machine::SessionState;
use voxway_gateway::core::stt::{SpeechToText, SttError};
use voxway_gateway::core::tts::{SpeechSynthesizer, TtsError};
use voxway_gateway::core::turn_detect::TurnDetectorConfig;
use voxway_gateway::core::watcher::watch_idle;
use voxway_gateway::handlers::voice::handle_interruption;

struct MockStt {
    transcript: Option<String>,
}

#[async_trait]
impl SpeechToText for MockStt {
    async fn transcribe(&self, _audio: Bytes) -> Result<Option<String>, SttError> {
        Ok(self.transcript.clone())
    }

    fn provider_info(&self) -> &'static str {
        "mock-stt"
    }
}

struct MockLlm {
    fragments: Vec<&'static str>,
    /// Ends the stream with an error after the fragments.
    fail: bool,
}

impl LanguageModel for MockLlm {
    fn stream_chat(
        &self,
        _messages: Vec<ChatMessage>,
    ) -> BoxStream<'static, Result<String, LlmError>> {
        let mut items: Vec<Result<String, LlmError>> = self
            .fragments
            .iter()
            .map(|f| Ok(f.to_string()))
            .collect();
        if self.fail {
            items.push(Err(LlmError::Configuration(
                "stream interrupted".to_string(),
            )));
        }
        stream::iter(items).boxed()
    }

    fn provider_info(&self) -> &'static str {
        "mock-llm"
    }
}

/// Emits two 10-byte chunks per sentence; sentences containing "fail"
/// produce an error instead.
struct MockTts;

impl SpeechSynthesizer for MockTts {
    fn synthesize(&self, text: &str) -> BoxStream<'static, Result<Bytes, TtsError>> {
        if text.contains("fail") {
            return stream::iter(vec![Err(TtsError::Configuration(
                "synthetic failure".to_string(),
            ))])
            .boxed();
        }
        stream::iter(vec![
            Ok(Bytes::from(vec![0u8; 10])),
            Ok(Bytes::from(vec![1u8; 10])),
        ])
        .boxed()
    }

    fn provider_info(&self) -> &'static str {
        "mock-tts"
    }
}

/// TTS that never produces a chunk, for cancellation tests.
struct HangingTts;

impl SpeechSynthesizer for HangingTts {
    fn synthesize(&self, _text: &str) -> BoxStream<'static, Result<Bytes, TtsError>> {
        stream::pending().boxed()
    }

    fn provider_info(&self) -> &'static str {
        "hanging-tts"
    }
}

fn session_in_processing() -> SharedSession {
    let mut session = Session::new("test-sess", TurnDetectorConfig::default());
    assert!(session.transition(SessionState::UserSpeaking));
    assert!(session.transition(SessionState::AiProcessing));
    // 1 second of speech so STT gets a plausible utterance
    session.audio_buffer = vec![0u8; 32_000];
    Arc::new(RwLock::new(session))
}

fn pipeline(
    transcript: Option<&str>,
    fragments: Vec<&'static str>,
    tts: Arc<dyn SpeechSynthesizer>,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(
        Arc::new(MockStt {
            transcript: transcript.map(String::from),
        }),
        Arc::new(MockLlm {
            fragments,
            fail: false,
        }),
        tts,
    )
}

async fn drain(rx: &mut mpsc::Receiver<MessageRoute>) -> Vec<MessageRoute> {
    let mut routes = Vec::new();
    while let Some(route) = rx.recv().await {
        routes.push(route);
    }
    routes
}

#[tokio::test]
async fn test_full_turn_event_sequence() {
    let session = session_in_processing();
    let orchestrator = pipeline(
        Some("Hi there"),
        vec!["Hel", "lo. How can I he", "lp"],
        Arc::new(MockTts),
    );
    let (tx, mut rx) = mpsc::channel(1024);

    orchestrator
        .run_turn(session.clone(), tx, CancellationToken::new())
        .await;
    let routes = drain(&mut rx).await;

    let expected = vec![
        MessageRoute::Event(OutgoingEvent::status_with_stage(
            SessionState::AiProcessing,
            "transcribing",
        )),
        MessageRoute::Event(OutgoingEvent::Transcript {
            text: "Hi there".to_string(),
        }),
        MessageRoute::Event(OutgoingEvent::status_with_stage(
            SessionState::AiProcessing,
            "thinking",
        )),
        MessageRoute::Event(OutgoingEvent::status(SessionState::AiSpeaking)),
        MessageRoute::Event(OutgoingEvent::AudioStart),
        MessageRoute::Audio(Bytes::from(vec![0u8; 10])),
        MessageRoute::Audio(Bytes::from(vec![1u8; 10])),
        // Remainder "How can I help" flushed as the final sentence
        MessageRoute::Audio(Bytes::from(vec![0u8; 10])),
        MessageRoute::Audio(Bytes::from(vec![1u8; 10])),
        MessageRoute::Event(OutgoingEvent::AudioEnd {
            audio_bytes_sent: 40,
        }),
        MessageRoute::Event(OutgoingEvent::TtsText {
            text: "Hello. How can I help".to_string(),
            has_audio: true,
        }),
        MessageRoute::Event(OutgoingEvent::status(SessionState::UserSpeaking)),
    ];
    assert_eq!(routes, expected);

    let s = session.read().await;
    assert!(s.is_state(SessionState::UserSpeaking));
    assert_eq!(s.memory.len(), 2);
    assert_eq!(s.memory[0].content, "Hi there");
    assert_eq!(s.memory[1].content, "Hello. How can I help");
    assert!(s.audio_buffer.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_empty_transcript_returns_to_listening() {
    let session = session_in_processing();
    let orchestrator = pipeline(None, vec!["unused"], Arc::new(MockTts));
    let (tx, mut rx) = mpsc::channel(1024);

    orchestrator
        .run_turn(session.clone(), tx, CancellationToken::new())
        .await;
    let routes = drain(&mut rx).await;

    assert_eq!(routes.len(), 3);
    assert!(matches!(
        &routes[1],
        MessageRoute::Event(OutgoingEvent::Error { .. })
    ));
    assert_eq!(
        routes[2],
        MessageRoute::Event(OutgoingEvent::status(SessionState::UserSpeaking))
    );

    let s = session.read().await;
    assert!(s.is_state(SessionState::UserSpeaking));
    assert!(s.memory.is_empty());
}

#[tokio::test]
async fn test_cancellation_suppresses_response() {
    let session = session_in_processing();
    let orchestrator = pipeline(Some("Hi"), vec!["Hello there."], Arc::new(HangingTts));
    let (tx, mut rx) = mpsc::channel(1024);
    let token = CancellationToken::new();

    let turn = tokio::spawn({
        let session = session.clone();
        let token = token.clone();
        async move { orchestrator.run_turn(session, tx, token).await }
    });

    // Wait until synthesis is underway, then barge in
    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();
    turn.await.unwrap();

    let routes = drain(&mut rx).await;
    let mut saw_audio_end = false;
    for route in &routes {
        match route {
            MessageRoute::Event(OutgoingEvent::AudioEnd { audio_bytes_sent }) => {
                saw_audio_end = true;
                assert_eq!(*audio_bytes_sent, 0);
            }
            MessageRoute::Event(OutgoingEvent::TtsText { .. }) => {
                panic!("cancelled turn must not report a response");
            }
            _ => {}
        }
    }
    assert!(saw_audio_end);

    // A cancelled turn leaves the state alone; the gateway resets it
    let s = session.read().await;
    assert!(s.memory.len() <= 1);
}

#[tokio::test]
async fn test_failed_sentence_is_skipped() {
    let session = session_in_processing();
    let orchestrator = pipeline(
        Some("Hi"),
        vec!["This will fail. This works though."],
        Arc::new(MockTts),
    );
    let (tx, mut rx) = mpsc::channel(1024);

    orchestrator
        .run_turn(session.clone(), tx, CancellationToken::new())
        .await;
    let routes = drain(&mut rx).await;

    // Only the second sentence produced audio
    let audio_frames = routes
        .iter()
        .filter(|r| matches!(r, MessageRoute::Audio(_)))
        .count();
    assert_eq!(audio_frames, 2);

    let audio_end = routes.iter().find_map(|r| match r {
        MessageRoute::Event(OutgoingEvent::AudioEnd { audio_bytes_sent }) => {
            Some(*audio_bytes_sent)
        }
        _ => None,
    });
    assert_eq!(audio_end, Some(20));

    // The full text is still reported and remembered
    let s = session.read().await;
    assert_eq!(s.memory[1].content, "This will fail. This works though.");
}

#[tokio::test]
async fn test_llm_failure_flushes_partial_response() {
    let session = session_in_processing();
    let orchestrator = PipelineOrchestrator::new(
        Arc::new(MockStt {
            transcript: Some("Hi".to_string()),
        }),
        Arc::new(MockLlm {
            fragments: vec!["Hello ", "wor"],
            fail: true,
        }),
        Arc::new(MockTts),
    );
    let (tx, mut rx) = mpsc::channel(1024);

    orchestrator
        .run_turn(session.clone(), tx, CancellationToken::new())
        .await;
    let routes = drain(&mut rx).await;

    // The buffered text before the stream error is still spoken
    let audio_frames = routes
        .iter()
        .filter(|r| matches!(r, MessageRoute::Audio(_)))
        .count();
    assert_eq!(audio_frames, 2);
    assert!(routes.contains(&MessageRoute::Event(OutgoingEvent::AudioEnd {
        audio_bytes_sent: 20,
    })));
    assert!(routes.contains(&MessageRoute::Event(OutgoingEvent::TtsText {
        text: "Hello wor".to_string(),
        has_audio: true,
    })));
    assert_eq!(
        routes.last(),
        Some(&MessageRoute::Event(OutgoingEvent::status(
            SessionState::UserSpeaking
        )))
    );

    let s = session.read().await;
    assert!(s.is_state(SessionState::UserSpeaking));
    assert_eq!(s.memory[1].content, "Hello wor");
}

fn frame_of(sample: i16) -> Vec<u8> {
    sample
        .to_le_bytes()
        .iter()
        .copied()
        .cycle()
        .take(FRAME_BYTES)
        .collect()
}

#[tokio::test]
async fn test_loud_frame_interrupts_ai_turn() {
    let session = session_in_processing();
    {
        let mut s = session.write().await;
        assert!(s.transition(SessionState::AiSpeaking));
    }

    // Stand-in for a running pipeline that honors its token
    let acknowledged = Arc::new(AtomicBool::new(false));
    let token = CancellationToken::new();
    let handle = tokio::spawn({
        let token = token.clone();
        let acknowledged = acknowledged.clone();
        async move {
            token.cancelled().await;
            acknowledged.store(true, Ordering::SeqCst);
        }
    });
    session.write().await.set_turn_task(TurnTask { handle, token });

    let (tx, mut rx) = mpsc::channel(16);
    // RMS of a constant 2000 signal is 2000, well over the 800 threshold
    assert!(handle_interruption(&session, &tx, &frame_of(2000)).await);
    drop(tx);

    let routes = drain(&mut rx).await;
    assert_eq!(
        routes,
        vec![
            MessageRoute::Event(OutgoingEvent::status(SessionState::UserSpeaking)),
            MessageRoute::Event(OutgoingEvent::Interrupt),
        ]
    );
    assert!(acknowledged.load(Ordering::SeqCst));

    let s = session.read().await;
    assert!(s.is_state(SessionState::UserSpeaking));
    assert!(s.audio_buffer.is_empty());
}

#[tokio::test]
async fn test_quiet_frame_does_not_interrupt() {
    let session = session_in_processing();
    let (tx, mut rx) = mpsc::channel(16);

    // Voiced but below the interrupt threshold
    assert!(!handle_interruption(&session, &tx, &frame_of(600)).await);
    drop(tx);

    assert!(drain(&mut rx).await.is_empty());
    let s = session.read().await;
    assert!(s.is_state(SessionState::AiProcessing));
    assert!(!s.audio_buffer.is_empty());
}

#[tokio::test]
async fn test_loud_frame_while_listening_is_not_an_interrupt() {
    let session: SharedSession = Arc::new(RwLock::new(Session::new(
        "listen-sess",
        TurnDetectorConfig::default(),
    )));
    session
        .write()
        .await
        .transition(SessionState::UserSpeaking);
    let (tx, mut rx) = mpsc::channel(16);

    assert!(!handle_interruption(&session, &tx, &frame_of(2000)).await);
    drop(tx);
    assert!(drain(&mut rx).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_idle_watcher_times_out_session() {
    let session: SharedSession = Arc::new(RwLock::new(Session::new(
        "idle-sess",
        TurnDetectorConfig::default(),
    )));
    {
        let mut s = session.write().await;
        s.transition(SessionState::UserSpeaking);
        s.add_user_message("hello");
    }
    let (tx, mut rx) = mpsc::channel(1024);

    let watcher = tokio::spawn(watch_idle(
        session.clone(),
        tx,
        Duration::from_secs(60),
    ));
    watcher.await.unwrap();

    let routes = drain(&mut rx).await;
    assert_eq!(
        routes,
        vec![
            MessageRoute::Event(OutgoingEvent::timeout_status()),
            MessageRoute::Close,
        ]
    );

    let s = session.read().await;
    assert!(s.is_state(SessionState::Idle));
    assert!(s.memory.is_empty());
}
