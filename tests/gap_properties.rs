use kline_watcher::{Candle, Gap, gapfixer::find_gaps};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn kline(open_time: i64, duration: i64) -> Candle {
    Candle {
        open_time,
        close_time: open_time + duration - 1,
        open: Decimal::ONE,
        high: Decimal::ONE,
        low: Decimal::ONE,
        close: Decimal::ONE,
        volume: Decimal::ZERO,
        trade_num: 1,
    }
}

/// A store page: fixed-width candles on a grid starting at `from`, some slots missing.
fn arb_page() -> impl Strategy<Value = (Vec<Candle>, i64)> {
    (
        2i64..=20,
        -1_000i64..1_000,
        proptest::collection::vec(any::<bool>(), 1..40),
    )
        .prop_map(|(duration, from, slots)| {
            let page = slots
                .iter()
                .enumerate()
                .filter(|(_, present)| **present)
                .map(|(i, _)| kline(from + i as i64 * duration, duration))
                .collect();
            (page, from)
        })
}

proptest! {
    #[test]
    fn empty_page_is_the_whole_window(from in -1_000i64..1_000, width in 0i64..10_000, chunk_size in 1usize..100) {
        let gaps = find_gaps(&[], from, from + width, chunk_size);
        prop_assert_eq!(gaps, vec![Gap::new(from, from + width)]);
    }

    #[test]
    fn packed_page_has_no_gaps(
        duration in 1i64..=60_000,
        from in 0i64..1_000_000,
        chunk_size in 1usize..200,
        beyond in 0i64..1_000_000,
    ) {
        let page: Vec<Candle> = (0..chunk_size as i64)
            .map(|i| kline(from + i * duration, duration))
            .collect();
        let to = page[page.len() - 1].close_time + beyond;
        prop_assert!(find_gaps(&page, from, to, chunk_size).is_empty());
    }

    #[test]
    fn gaps_and_candles_tile_the_window(
        (page, from) in arb_page(),
        spare in 0usize..4,
        reach in 0i64..100,
    ) {
        prop_assume!(!page.is_empty());
        let chunk_size = page.len() + spare;
        let last = page[page.len() - 1].clone();
        let to = last.open_time + reach;

        let gaps = find_gaps(&page, from, to, chunk_size);

        let mut spans: Vec<(i64, i64)> = page.iter().map(|c| (c.open_time, c.close_time)).collect();
        for gap in &gaps {
            prop_assert!(gap.start <= gap.end, "inverted gap {}", gap);
            spans.push((gap.start, gap.end));
        }
        spans.sort();

        // A full page says nothing past its last candle
        let short = page.len() < chunk_size;
        let end = if short && last.close_time + 1 < to { to } else { last.close_time };

        prop_assert_eq!(spans[0].0, from);
        for pair in spans.windows(2) {
            prop_assert_eq!(pair[0].1 + 1, pair[1].0);
        }
        prop_assert_eq!(spans[spans.len() - 1].1, end);
    }

    #[test]
    fn gaps_are_ordered(
        (page, from) in arb_page(),
        spare in 0usize..4,
        reach in 0i64..100,
    ) {
        prop_assume!(!page.is_empty());
        let to = page[page.len() - 1].open_time + reach;
        let gaps = find_gaps(&page, from, to, page.len() + spare);
        for pair in gaps.windows(2) {
            prop_assert!(pair[0].end < pair[1].start);
        }
    }
}
