use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use parley::core::constants::{DEFAULT_MODEL, END_OF_TURN_MARKER};
use parley::core::message::ChatMessage;
use parley::core::prompt::{PromptBuilder, PromptRequest, PromptSettings};
use parley::core::store::{LruMessageStore, MessageStore};
use parley::core::tokens::TokenCounter;

/// Chain of `turns` alternating user/assistant messages; returns the id of
/// the newest one.
async fn fill_chain(store: &LruMessageStore, turns: usize, base: &str) -> Option<String> {
    let mut parent: Option<String> = None;
    for i in 0..turns {
        let id = format!("m{i}");
        let message = if i % 2 == 0 {
            ChatMessage::user(id.as_str(), base, parent.clone(), Some("bench".into()))
        } else {
            ChatMessage {
                text: base.to_string(),
                ..ChatMessage::pending_reply(id.as_str(), parent.clone().unwrap_or_default(), Some("bench".into()))
            }
        };
        let _ = store.set(&id, message).await;
        parent = Some(id);
    }
    parent
}

fn bench_prompt_build(c: &mut Criterion) {
    let base = "lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod tempor incididunt ut labore et dolore magna aliqua";
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let counter = TokenCounter::for_model(DEFAULT_MODEL, END_OF_TURN_MARKER).expect("tokenizer");

    for &turns in &[10usize, 200usize] {
        let store = LruMessageStore::default();
        let parent = runtime.block_on(fill_chain(&store, turns, base));

        let mut group = c.benchmark_group(format!("prompt_build_turns{turns}"));
        group.throughput(Throughput::Elements(turns as u64));

        // 4096 fits a handful of turns; the large window walks the whole chain.
        for &max_model_tokens in &[4096usize, 32_768usize] {
            let settings = PromptSettings {
                max_model_tokens,
                max_response_tokens: 1000,
                user_label: "User".to_string(),
                assistant_label: "ChatGPT".to_string(),
                end_marker: END_OF_TURN_MARKER.to_string(),
            };
            group.bench_with_input(
                BenchmarkId::new("context", max_model_tokens),
                &settings,
                |b, settings| {
                    let builder = PromptBuilder::new(settings, &counter, &store);
                    b.iter(|| {
                        runtime
                            .block_on(builder.build(PromptRequest {
                                message: "What comes next?",
                                parent_message_id: parent.as_deref(),
                                ..Default::default()
                            }))
                            .expect("prompt")
                    })
                },
            );
        }
        group.finish();
    }
}

fn bench_token_count(c: &mut Criterion) {
    let counter = TokenCounter::for_model(DEFAULT_MODEL, END_OF_TURN_MARKER).expect("tokenizer");
    let text = "User:\n\nlorem ipsum dolor sit amet<|im_end|>\n\n".repeat(100);
    c.bench_function("token_count_100_turns", |b| b.iter(|| counter.count(&text)));
}

criterion_group!(benches, bench_prompt_build, bench_token_count);
criterion_main!(benches);
