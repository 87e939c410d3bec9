use crate::schema::{Candle, Gap};

/// Finds the gaps of one store page against the window `[from, to]`.
///
/// `klines` must be ordered by open time. Gaps come out in time order.
///
/// Evidence is purely structural: the page itself tells whether
/// candles are contiguous, no gap bookkeeping is consulted.
///
/// - empty page: the whole window is one gap
/// - full page starting at `from` and ending where `chunk_size` packed
///   candles would end: provably gapless, nothing to do
/// - otherwise: leading, interior and (short pages only) trailing gaps
///
/// The candle width is taken from the first row. Series whose width
/// changes inside a page can be reported gapless when they are not.
pub fn find_gaps(klines: &[Candle], from: i64, to: i64, chunk_size: usize) -> Vec<Gap> {
    let (Some(first), Some(last)) = (klines.first(), klines.last()) else {
        return vec![Gap::new(from, to)];
    };

    let duration = first.duration();
    let packed_close = from + duration * chunk_size as i64 - 1;
    if klines.len() == chunk_size && first.open_time == from && last.close_time == packed_close {
        return Vec::new();
    }

    let mut gaps = Vec::new();

    if first.open_time > from {
        gaps.push(Gap::new(from, first.open_time - 1));
    }

    for pair in klines.windows(2) {
        let (left, right) = (&pair[0], &pair[1]);
        if left.close_time + 1 < right.open_time {
            gaps.push(Gap::new(left.close_time + 1, right.open_time - 1));
        }
    }

    // A full page says nothing about what follows it; the next page will.
    if klines.len() < chunk_size && last.close_time + 1 < to {
        gaps.push(Gap::new(last.close_time + 1, to));
    }

    gaps
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn k(open_time: i64, close_time: i64) -> Candle {
        Candle {
            open_time,
            close_time,
            open: Decimal::ZERO,
            high: Decimal::ZERO,
            low: Decimal::ZERO,
            close: Decimal::ZERO,
            volume: Decimal::ZERO,
            trade_num: 0,
        }
    }

    fn g(start: i64, end: i64) -> Gap {
        Gap::new(start, end)
    }

    #[test]
    fn table() {
        struct Case {
            name: &'static str,
            klines: Vec<Candle>,
            from: i64,
            to: i64,
            chunk_size: usize,
            want: Vec<Gap>,
        }

        let cases = [
            Case {
                name: "no params",
                klines: vec![],
                from: 0,
                to: 0,
                chunk_size: 0,
                want: vec![g(0, 0)],
            },
            Case {
                name: "one kline",
                klines: vec![k(0, 9)],
                from: 0,
                to: 10,
                chunk_size: 1,
                want: vec![],
            },
            Case {
                name: "no gaps",
                klines: vec![k(0, 9), k(10, 19), k(20, 29), k(30, 39)],
                from: 0,
                to: 40,
                chunk_size: 4,
                want: vec![],
            },
            Case {
                name: "gap in middle",
                klines: vec![k(0, 9), k(30, 39), k(40, 49), k(50, 59)],
                from: 0,
                to: 60,
                chunk_size: 4,
                want: vec![g(10, 29)],
            },
            Case {
                name: "a few gaps in middle",
                klines: vec![k(0, 9), k(30, 39), k(50, 59)],
                from: 0,
                to: 0,
                chunk_size: 6,
                want: vec![g(10, 29), g(40, 49)],
            },
            Case {
                name: "all possible gaps",
                klines: vec![k(10, 19), k(30, 39), k(50, 59)],
                from: 0,
                to: 100,
                chunk_size: 3,
                want: vec![g(0, 9), g(20, 29), g(40, 49)],
            },
            Case {
                name: "empty start",
                klines: vec![k(40, 49), k(50, 59)],
                from: 0,
                to: 0,
                chunk_size: 6,
                want: vec![g(0, 39)],
            },
            Case {
                name: "empty end",
                klines: vec![k(30, 39), k(40, 49), k(50, 59)],
                from: 30,
                to: 90,
                chunk_size: 6,
                want: vec![g(60, 90)],
            },
            Case {
                name: "empty klines",
                klines: vec![],
                from: 0,
                to: 60,
                chunk_size: 0,
                want: vec![g(0, 60)],
            },
            Case {
                name: "short page reaching the window end",
                klines: vec![k(0, 9), k(30, 39)],
                from: 0,
                to: 40,
                chunk_size: 4,
                want: vec![g(10, 29)],
            },
        ];

        for case in cases {
            assert_eq!(
                find_gaps(&case.klines, case.from, case.to, case.chunk_size),
                case.want,
                "{}",
                case.name
            );
        }
    }

    #[test]
    fn full_page_not_aligned_to_from_reports_leading_gap_only() {
        let klines = vec![k(10, 19), k(20, 29)];
        assert_eq!(find_gaps(&klines, 0, 100, 2), vec![g(0, 9)]);
    }
}
