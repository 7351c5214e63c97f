use proptest::prelude::*;
use workerwatch::progress::{ProgressState, apply};
use workerwatch::protocol::{ClassifiedLine, OutputLineParser, ProgressMarker};

fn feed_all(chunks: &[Vec<u8>]) -> Vec<ClassifiedLine> {
    let mut parser = OutputLineParser::new();
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend(parser.feed(chunk));
    }
    out.extend(parser.finish());
    out
}

// Lines drawn from the real protocol plus noise, including multi-byte text.
fn line_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u64..50, 1u64..50).prop_map(|(c, t)| format!("PROGRESS:SBERT_PROGRESS:{c}:{t}")),
        Just("PROGRESS:LLM_END:{\"Likely\": 2}".to_string()),
        Just("JSON_OUTPUT_PATH:/tmp/r.json".to_string()),
        Just("[WARNING] réessai après délai".to_string()),
        "[a-zA-Z0-9 :\\[\\]]{0,40}",
        Just(String::new()),
    ]
}

fn stream_strategy() -> impl Strategy<Value = (Vec<u8>, Vec<usize>)> {
    (
        proptest::collection::vec(line_strategy(), 0..20),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_flat_map(|(lines, crlf, trailing_newline)| {
            let sep = if crlf { "\r\n" } else { "\n" };
            let mut text = lines.join(sep);
            if trailing_newline {
                text.push_str(sep);
            }
            let bytes = text.into_bytes();
            let len = bytes.len();
            (Just(bytes), proptest::collection::vec(0..=len, 0..8))
        })
}

fn split_at_points(bytes: &[u8], mut points: Vec<usize>) -> Vec<Vec<u8>> {
    points.sort_unstable();
    let mut chunks = Vec::new();
    let mut start = 0;
    for p in points {
        chunks.push(bytes[start..p].to_vec());
        start = p;
    }
    chunks.push(bytes[start..].to_vec());
    chunks
}

proptest! {
    #[test]
    fn chunk_boundaries_do_not_change_classification((bytes, points) in stream_strategy()) {
        let whole = feed_all(&[bytes.clone()]);
        let chunked = feed_all(&split_at_points(&bytes, points));
        prop_assert_eq!(whole, chunked);
    }

    #[test]
    fn sbert_progress_stays_in_band_and_is_monotonic(total in 1u64..500, a in 1u64..500, b in 1u64..500) {
        let (lo, hi) = (a.min(b).min(total), a.max(b).min(total));
        let at = |c: u64| {
            let marker = ProgressMarker::parse(&format!("SBERT_PROGRESS:{c}:{total}"));
            apply(&ProgressState::default(), &marker).percent
        };

        let (p_lo, p_hi) = (at(lo), at(hi));
        prop_assert!((5..=30).contains(&p_lo));
        prop_assert!((5..=30).contains(&p_hi));
        prop_assert!(p_lo <= p_hi);
    }

    #[test]
    fn overall_markers_are_absolute(percent in 0u8..=100) {
        let state = ProgressState { percent, ..ProgressState::default() };
        prop_assert_eq!(apply(&state, &ProgressMarker::parse("OVERALL_START")).percent, 0);
        prop_assert_eq!(apply(&state, &ProgressMarker::parse("OVERALL_END")).percent, 100);
    }
}
