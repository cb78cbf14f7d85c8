//! Turn pipeline: STT -> streaming LLM -> sentence-by-sentence TTS
//!
//! One `run_turn` call services one user utterance. The LLM producer and
//! the TTS consumer run concurrently, connected by a bounded sentence
//! channel; dropping the sender is the end-of-stream signal, so every
//! exit path (completion, provider error, cancellation) drains the same
//! way. Audio starts playing as soon as the first full sentence exists,
//! while the model is still generating the rest.

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{MessageRoute, OutgoingEvent};
use super::llm::LanguageModel;
use super::session::{ChatMessage, SharedSession};
use super::splitter::split_sentences;
use super::state_machine::SessionState;
use super::stt::{transcribe_with_retry, SpeechToText};
use super::tts::SpeechSynthesizer;

/// Sentences the producer may run ahead of playback.
pub const SENTENCE_QUEUE_CAPACITY: usize = 8;

/// How long a cancelled producer gets to wind down before being aborted.
const PRODUCER_GRACE: Duration = Duration::from_secs(1);

const EMPTY_TRANSCRIPT_MESSAGE: &str = "Sorry, I didn't catch that. Could you repeat?";

/// Immutable bundle of the three providers; cheap to clone into tasks.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    stt: Arc<dyn SpeechToText>,
    llm: Arc<dyn LanguageModel>,
    tts: Arc<dyn SpeechSynthesizer>,
}

impl PipelineOrchestrator {
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        llm: Arc<dyn LanguageModel>,
        tts: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self { stt, llm, tts }
    }

    /// Run one full turn. The caller has already moved the session to
    /// `AiProcessing`; this either plays a complete response and returns
    /// the session to `UserSpeaking`, or bails out early on an empty
    /// transcript or cancellation.
    pub async fn run_turn(
        &self,
        session: SharedSession,
        routes: mpsc::Sender<MessageRoute>,
        token: CancellationToken,
    ) {
        let turn_start = Instant::now();

        let (session_id, audio) = {
            let mut s = session.write().await;
            let audio = Bytes::from(std::mem::take(&mut s.audio_buffer));
            s.reset_turn();
            (s.id.clone(), audio)
        };

        let _ = routes
            .send(MessageRoute::Event(OutgoingEvent::status_with_stage(
                SessionState::AiProcessing,
                "transcribing",
            )))
            .await;

        let transcript = tokio::select! {
            _ = token.cancelled() => {
                debug!(session_id = %session_id, "turn cancelled during transcription");
                return;
            }
            result = transcribe_with_retry(self.stt.as_ref(), audio) => result,
        };

        let Some(transcript) = transcript else {
            info!(session_id = %session_id, "empty transcript, returning to listening");
            let _ = routes
                .send(MessageRoute::Event(OutgoingEvent::Error {
                    message: EMPTY_TRANSCRIPT_MESSAGE.to_string(),
                }))
                .await;
            let mut s = session.write().await;
            s.transition(SessionState::UserSpeaking);
            let _ = routes
                .send(MessageRoute::Event(OutgoingEvent::status(s.state())))
                .await;
            return;
        };

        info!(
            session_id = %session_id,
            stt_ms = turn_start.elapsed().as_millis() as u64,
            "transcribed: {transcript}"
        );
        let _ = routes
            .send(MessageRoute::Event(OutgoingEvent::Transcript {
                text: transcript.clone(),
            }))
            .await;

        let messages = {
            let mut s = session.write().await;
            s.add_user_message(&transcript);
            s.history()
        };

        let _ = routes
            .send(MessageRoute::Event(OutgoingEvent::status_with_stage(
                SessionState::AiProcessing,
                "thinking",
            )))
            .await;

        // Producer: LLM fragments -> complete sentences. The consumer
        // below plays them; the shared accumulator survives an abort so
        // partial responses still reach conversation memory.
        let (sentence_tx, mut sentence_rx) = mpsc::channel::<String>(SENTENCE_QUEUE_CAPACITY);
        let full_response = Arc::new(Mutex::new(String::new()));

        let producer = tokio::spawn(produce_sentences(
            self.llm.clone(),
            messages,
            sentence_tx,
            full_response.clone(),
            token.clone(),
            session_id.clone(),
        ));
        let producer_abort = producer.abort_handle();

        let mut audio_bytes_sent: u64 = 0;
        let mut speaking = false;
        let mut cancelled = false;
        let mut first_audio_at: Option<Instant> = None;

        'turn: loop {
            let sentence = tokio::select! {
                _ = token.cancelled() => {
                    cancelled = true;
                    break 'turn;
                }
                next = sentence_rx.recv() => match next {
                    Some(sentence) => sentence,
                    None => break 'turn,
                },
            };

            if !speaking {
                speaking = true;
                let mut s = session.write().await;
                s.transition(SessionState::AiSpeaking);
                let _ = routes
                    .send(MessageRoute::Event(OutgoingEvent::status(s.state())))
                    .await;
                let _ = routes
                    .send(MessageRoute::Event(OutgoingEvent::AudioStart))
                    .await;
            }

            debug!(session_id = %session_id, "synthesizing: {sentence}");
            let mut chunks = self.tts.synthesize(&sentence);
            loop {
                let chunk = tokio::select! {
                    _ = token.cancelled() => {
                        cancelled = true;
                        break 'turn;
                    }
                    chunk = chunks.next() => match chunk {
                        Some(chunk) => chunk,
                        None => break,
                    },
                };
                match chunk {
                    Ok(audio) => {
                        if first_audio_at.is_none() {
                            first_audio_at = Some(Instant::now());
                        }
                        audio_bytes_sent += audio.len() as u64;
                        if routes.send(MessageRoute::Audio(audio)).await.is_err() {
                            // Socket gone, nothing left to play to
                            cancelled = true;
                            break 'turn;
                        }
                    }
                    // A failed sentence is skipped, the turn continues
                    Err(err) => {
                        error!(session_id = %session_id, "synthesis failed, skipping sentence: {err}");
                        break;
                    }
                }
            }
        }

        // Let the producer notice the token, then force the issue
        match tokio::time::timeout(PRODUCER_GRACE, producer).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) if err.is_cancelled() => {}
            Ok(Err(err)) => warn!(session_id = %session_id, "producer ended abnormally: {err}"),
            Err(_) => producer_abort.abort(),
        }

        let _ = routes
            .send(MessageRoute::Event(OutgoingEvent::AudioEnd {
                audio_bytes_sent,
            }))
            .await;

        let response = {
            let text = full_response.lock();
            text.trim().to_string()
        };
        if !response.is_empty() && !cancelled {
            let mut s = session.write().await;
            s.add_assistant_message(&response);
            let _ = routes
                .send(MessageRoute::Event(OutgoingEvent::TtsText {
                    text: response,
                    has_audio: audio_bytes_sent > 0,
                }))
                .await;
        }

        if cancelled {
            // Barge-in path: the gateway loop owns the state transition
            debug!(session_id = %session_id, "turn cancelled");
            return;
        }

        {
            let mut s = session.write().await;
            s.transition(SessionState::UserSpeaking);
            let _ = routes
                .send(MessageRoute::Event(OutgoingEvent::status(s.state())))
                .await;
        }

        info!(
            session_id = %session_id,
            total_ms = turn_start.elapsed().as_millis() as u64,
            first_audio_ms = first_audio_at.map(|t| (t - turn_start).as_millis() as u64),
            audio_bytes_sent,
            "turn complete"
        );
    }
}

/// Drain the LLM stream, accumulate the full response and push complete
/// sentences into the bounded channel. Dropping the sender on *every*
/// exit path is what tells the consumer the stream is over.
async fn produce_sentences(
    llm: Arc<dyn LanguageModel>,
    messages: Vec<ChatMessage>,
    sentences: mpsc::Sender<String>,
    full_response: Arc<Mutex<String>>,
    token: CancellationToken,
    session_id: String,
) {
    let mut stream = llm.stream_chat(messages);
    let mut buffer = String::new();
    let mut first_fragment = true;

    loop {
        let fragment = tokio::select! {
            _ = token.cancelled() => return,
            next = stream.next() => match next {
                Some(Ok(fragment)) => fragment,
                Some(Err(err)) => {
                    error!(session_id = %session_id, "LLM stream failed: {err}");
                    break;
                }
                None => break,
            },
        };

        if first_fragment {
            first_fragment = false;
            debug!(session_id = %session_id, "first LLM fragment");
        }

        full_response.lock().push_str(&fragment);
        buffer.push_str(&fragment);

        let (complete, rest) = split_sentences(&buffer);
        buffer = rest;
        for sentence in complete {
            // Consumer dropped its end: playback is over, stop generating
            if sentences.send(sentence).await.is_err() {
                return;
            }
        }
    }

    let remainder = buffer.trim();
    if !remainder.is_empty() {
        let _ = sentences.send(remainder.to_string()).await;
    }
}
