//! # Gemini Live Wire Protocol
//!
//! Serde shapes for the JSON frames exchanged with the `BidiGenerateContent`
//! WebSocket endpoint, plus the mapping from server frames to
//! [`InboundEvent`]s.
//!
//! ## Frames Sent:
//! - `{"setup": {...}}` once, immediately after the socket opens
//! - `{"realtimeInput": {"audio": {"data", "mimeType"}}}` per captured frame
//!
//! ## Frames Received:
//! - `{"setupComplete": {}}`: handshake done
//! - `{"serverContent": {...}}`: transcripts, audio, turn signals
//! - `{"goAway": {"timeLeft"}}`: the server will close soon
//!
//! Fields this engine does not use (tool calls, usage metadata) are ignored.

use crate::audio::codec::WireChunk;
use crate::live::transport::{InboundEvent, LiveSetup};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientSetupMessage<'a> {
    setup: Setup<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup<'a> {
    model: &'a str,
    generation_config: GenerationConfig<'a>,
    system_instruction: Content<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<Empty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_transcription: Option<Empty>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: Vec<&'a str>,
    speech_config: SpeechConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceSelection<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    prebuilt_voice_config: PrebuiltVoice<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoice<'a> {
    voice_name: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

/// Serializes as `{}`; the API enables a feature by the key being present.
#[derive(Debug, Serialize)]
struct Empty {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInputMessage<'a> {
    realtime_input: RealtimeInput<'a>,
}

#[derive(Debug, Serialize)]
struct RealtimeInput<'a> {
    audio: Blob<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob<'a> {
    data: &'a str,
    mime_type: &'a str,
}

/// Build the opening `setup` frame.
pub fn encode_setup(setup: &LiveSetup) -> Result<String, serde_json::Error> {
    let message = ClientSetupMessage {
        setup: Setup {
            model: &setup.model,
            generation_config: GenerationConfig {
                response_modalities: vec![setup.response_modality.as_str()],
                speech_config: SpeechConfig {
                    voice_config: VoiceSelection {
                        prebuilt_voice_config: PrebuiltVoice {
                            voice_name: &setup.voice,
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: &setup.system_instruction,
                }],
            },
            input_audio_transcription: setup.input_transcription.then_some(Empty {}),
            output_audio_transcription: setup.output_transcription.then_some(Empty {}),
        },
    };
    serde_json::to_string(&message)
}

/// Build a `realtimeInput` frame carrying one audio chunk.
pub fn encode_audio(chunk: &WireChunk) -> Result<String, serde_json::Error> {
    serde_json::to_string(&RealtimeInputMessage {
        realtime_input: RealtimeInput {
            audio: Blob {
                data: &chunk.data,
                mime_type: &chunk.mime_type,
            },
        },
    })
}

/// One frame from the server.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    server_content: Option<ServerContent>,
    #[serde(default)]
    go_away: Option<GoAway>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    #[serde(default)]
    model_turn: Option<ModelTurn>,
    #[serde(default)]
    input_transcription: Option<Transcription>,
    #[serde(default)]
    output_transcription: Option<Transcription>,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    data: String,
    #[serde(default)]
    mime_type: String,
}

#[derive(Debug, Default, Deserialize)]
struct Transcription {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoAway {
    #[serde(default)]
    time_left: Option<String>,
}

impl ServerMessage {
    /// `Some(time_left)` when this frame announces an upcoming disconnect.
    /// The inner value is empty when the server gave no estimate.
    pub fn go_away(&self) -> Option<&str> {
        self.go_away
            .as_ref()
            .map(|go_away| go_away.time_left.as_deref().unwrap_or(""))
    }

    /// Demultiplex into engine events.
    ///
    /// ## Order:
    /// 1. `opened` (from `setupComplete`)
    /// 2. input transcript delta
    /// 3. output transcript delta
    /// 4. one audio delta per inline-data part
    /// 5. `interrupted`
    /// 6. `turn-complete`
    ///
    /// Transcript fragments with empty text are skipped.
    pub fn into_events(self) -> Vec<InboundEvent> {
        let mut events = Vec::new();

        if self.setup_complete.is_some() {
            events.push(InboundEvent::Opened);
        }

        let Some(content) = self.server_content else {
            return events;
        };

        if let Some(input) = content.input_transcription {
            if !input.text.is_empty() {
                events.push(InboundEvent::InputTranscriptDelta(input.text));
            }
        }
        if let Some(output) = content.output_transcription {
            if !output.text.is_empty() {
                events.push(InboundEvent::OutputTranscriptDelta(output.text));
            }
        }
        if let Some(turn) = content.model_turn {
            events.extend(
                turn.parts
                    .into_iter()
                    .filter_map(|part| part.inline_data)
                    .map(|blob| InboundEvent::AudioDelta(WireChunk::new(blob.data, blob.mime_type))),
            );
        }
        if content.interrupted {
            events.push(InboundEvent::Interrupted);
        }
        if content.turn_complete {
            events.push(InboundEvent::TurnComplete);
        }

        events
    }
}

/// Parse one text frame from the server.
pub fn decode_server_message(text: &str) -> Result<ServerMessage, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn setup() -> LiveSetup {
        LiveSetup {
            model: "models/test-model".to_string(),
            voice: "Zephyr".to_string(),
            response_modality: "AUDIO".to_string(),
            input_transcription: true,
            output_transcription: false,
            system_instruction: "Be brief.".to_string(),
            outbound_queue: 8,
        }
    }

    #[test]
    fn test_setup_frame_shape() {
        let frame: Value = serde_json::from_str(&encode_setup(&setup()).unwrap()).unwrap();

        assert_eq!(
            frame,
            json!({
                "setup": {
                    "model": "models/test-model",
                    "generationConfig": {
                        "responseModalities": ["AUDIO"],
                        "speechConfig": {
                            "voiceConfig": {"prebuiltVoiceConfig": {"voiceName": "Zephyr"}}
                        }
                    },
                    "systemInstruction": {"parts": [{"text": "Be brief."}]},
                    "inputAudioTranscription": {}
                }
            })
        );
    }

    #[test]
    fn test_audio_frame_shape() {
        let chunk = WireChunk::new("AAA=", "audio/pcm;rate=16000");
        let frame: Value = serde_json::from_str(&encode_audio(&chunk).unwrap()).unwrap();
        assert_eq!(
            frame,
            json!({"realtimeInput": {"audio": {"data": "AAA=", "mimeType": "audio/pcm;rate=16000"}}})
        );
    }

    #[test]
    fn test_setup_complete_opens() {
        let events = decode_server_message(r#"{"setupComplete":{}}"#).unwrap().into_events();
        assert_eq!(events, vec![InboundEvent::Opened]);
    }

    #[test]
    fn test_server_content_demux_order() {
        let text = json!({
            "serverContent": {
                "turnComplete": true,
                "interrupted": true,
                "modelTurn": {"parts": [
                    {"inlineData": {"data": "AAA=", "mimeType": "audio/pcm;rate=24000"}},
                    {"text": "ignored"},
                    {"inlineData": {"data": "BBB=", "mimeType": "audio/pcm;rate=24000"}}
                ]},
                "outputTranscription": {"text": "Hi"},
                "inputTranscription": {"text": "Hello"}
            }
        })
        .to_string();

        let events = decode_server_message(&text).unwrap().into_events();
        assert_eq!(
            events,
            vec![
                InboundEvent::InputTranscriptDelta("Hello".to_string()),
                InboundEvent::OutputTranscriptDelta("Hi".to_string()),
                InboundEvent::AudioDelta(WireChunk::new("AAA=", "audio/pcm;rate=24000")),
                InboundEvent::AudioDelta(WireChunk::new("BBB=", "audio/pcm;rate=24000")),
                InboundEvent::Interrupted,
                InboundEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn test_empty_transcripts_are_skipped() {
        let text = r#"{"serverContent":{"inputTranscription":{"text":""},"outputTranscription":{}}}"#;
        assert!(decode_server_message(text).unwrap().into_events().is_empty());
    }

    #[test]
    fn test_go_away_and_unknown_fields() {
        let message = decode_server_message(r#"{"goAway":{"timeLeft":"10s"},"usageMetadata":{"x":1}}"#).unwrap();
        assert_eq!(message.go_away(), Some("10s"));
        assert!(message.into_events().is_empty());
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(decode_server_message("not json").is_err());
    }
}
