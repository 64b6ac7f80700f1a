//! Upstream SSE consumption through the shared decoder with each provider
//! family's parser, including hostile chunking.

use futures::StreamExt;
use futures::stream;
use sparkgate::llm::{StreamEvent, Usage, anthropic, dashscope, openai, sse::decode_events};

fn body(chunks: Vec<&'static [u8]>) -> sparkgate::llm::sse::ByteStream {
    stream::iter(
        chunks
            .into_iter()
            .map(|c| Ok(bytes::Bytes::from_static(c)))
            .collect::<Vec<reqwest::Result<bytes::Bytes>>>(),
    )
    .boxed()
}

#[tokio::test]
async fn openai_stream_split_mid_codepoint() {
    // "你好" split between chunks inside the second codepoint.
    let chunks: Vec<&'static [u8]> = vec![
        b"data: {\"choices\":[{\"delta\":{\"content\":\"\xE4\xBD\xA0",
        b"\xE5\xA5\xBD\"}}]}\n\ndata: [DONE]\n\n",
    ];
    let events: Vec<_> = decode_events(body(chunks), openai::parse_data)
        .collect()
        .await;
    assert_eq!(
        events,
        vec![StreamEvent::Delta("你好".to_string()), StreamEvent::Done]
    );
}

#[tokio::test]
async fn openai_stream_as_single_buffered_blob() {
    let blob: &'static [u8] = b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n\
data: {\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2}}\n\n\
data: [DONE]\n\n";
    let events: Vec<_> = decode_events(body(vec![blob]), openai::parse_data)
        .collect()
        .await;
    assert_eq!(
        events,
        vec![
            StreamEvent::Delta("a".to_string()),
            StreamEvent::Delta("b".to_string()),
            StreamEvent::Usage(Usage {
                prompt_tokens: Some(5),
                completion_tokens: Some(2),
            }),
            StreamEvent::Done,
        ]
    );
}

#[tokio::test]
async fn anthropic_stream_reports_usage_from_both_ends() {
    let blob: &'static [u8] = b"data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":11}}}\n\n\
data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"hi\"}}\n\n\
data: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":4}}\n\n\
data: {\"type\":\"message_stop\"}\n\n";
    let events: Vec<_> = decode_events(body(vec![blob]), anthropic::parse_data)
        .collect()
        .await;

    let mut usage = Usage::default();
    let mut text = String::new();
    for event in &events {
        match event {
            StreamEvent::Usage(u) => usage.merge(*u),
            StreamEvent::Delta(d) => text.push_str(d),
            _ => {}
        }
    }
    assert_eq!(text, "hi");
    assert_eq!(usage.prompt_tokens, Some(11));
    assert_eq!(usage.completion_tokens, Some(4));
    assert_eq!(events.last(), Some(&StreamEvent::Done));
}

#[tokio::test]
async fn anthropic_error_event_terminates_stream() {
    let blob: &'static [u8] = b"data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"par\"}}\n\n\
data: {\"type\":\"error\",\"error\":{\"message\":\"overloaded\"}}\n\n\
data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"never\"}}\n\n";
    let events: Vec<_> = decode_events(body(vec![blob]), anthropic::parse_data)
        .collect()
        .await;
    assert_eq!(
        events,
        vec![
            StreamEvent::Delta("par".to_string()),
            StreamEvent::Error("overloaded".to_string()),
        ]
    );
}

#[tokio::test]
async fn dashscope_final_chunk_carries_text_usage_and_stop() {
    let blob: &'static [u8] = b"data: {\"output\":{\"choices\":[{\"message\":{\"content\":\"part\"},\"finish_reason\":\"null\"}]}}\n\n\
data: {\"output\":{\"choices\":[{\"message\":{\"content\":\"ing\"},\"finish_reason\":\"stop\"}]},\"usage\":{\"input_tokens\":8,\"output_tokens\":3}}\n\n";
    let events: Vec<_> = decode_events(body(vec![blob]), dashscope::parse_data)
        .collect()
        .await;
    assert_eq!(
        events,
        vec![
            StreamEvent::Delta("part".to_string()),
            StreamEvent::Delta("ing".to_string()),
            StreamEvent::Usage(Usage {
                prompt_tokens: Some(8),
                completion_tokens: Some(3),
            }),
            StreamEvent::Done,
        ]
    );
}
