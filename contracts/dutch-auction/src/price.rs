use concordium_std::*;

use crate::external::AuctionConfig;

/// Width of the anti-snipe window before the deadline, in milliseconds.
pub const EXTENSION_WINDOW_MILLIS: u64 = 5 * 60 * 1000;

/// Price at `now` for a round that opened at `start` and currently closes at `end`.
///
/// The price falls linearly from the start price to the reserve price over the configured duration, counted from
/// `start`, and stays at the reserve afterwards. At or past `end` it is always the reserve. The result is
/// non-increasing in `now` and lies between the reserve and the start price.
pub fn current_price(
    config: &AuctionConfig,
    start: Timestamp,
    end: Timestamp,
    now: Timestamp,
) -> Amount {
    let duration = config.duration.millis();
    if now >= end || duration == 0 {
        return config.reserve_price;
    }

    let reserve = config.reserve_price.micro_ccd;
    let elapsed = now.timestamp_millis().saturating_sub(start.timestamp_millis());
    let range = config.start_price.micro_ccd.saturating_sub(reserve);
    let drop = u128::from(elapsed) * u128::from(range) / u128::from(duration);

    // An extended round outlives `start + duration`, where `drop` exceeds the range
    let price = u128::from(config.start_price.micro_ccd)
        .saturating_sub(drop)
        .max(u128::from(reserve));

    // Bounded by the larger of the start and reserve price, both u64
    Amount::from_micro_ccd(price as u64)
}

/// Deadline after a bid accepted at `now`.
///
/// A bid inside the final window moves the deadline to `now` plus the window. The deadline never moves backwards.
pub fn extended_deadline(end: Timestamp, now: Timestamp) -> Timestamp {
    let extended = now
        .timestamp_millis()
        .saturating_add(EXTENSION_WINDOW_MILLIS);
    if extended > end.timestamp_millis() {
        Timestamp::from_timestamp_millis(extended)
    } else {
        end
    }
}

#[concordium_cfg_test]
mod tests {
    use super::*;
    use commons::Token;
    use concordium_cis2::{TokenAmountU64, TokenIdVec};

    const START: u64 = 1_000_000;

    fn config(start_price: u64, reserve_price: u64, duration_millis: u64) -> AuctionConfig {
        AuctionConfig {
            asset: Token {
                contract: ContractAddress {
                    index: 1,
                    subindex: 0,
                },
                id: TokenIdVec(vec![0]),
            },
            duration: Duration::from_millis(duration_millis),
            total_quantity: TokenAmountU64(100),
            start_price: Amount::from_micro_ccd(start_price),
            reserve_price: Amount::from_micro_ccd(reserve_price),
            decay_rate: Amount::zero(),
        }
    }

    fn at(offset: u64) -> Timestamp {
        Timestamp::from_timestamp_millis(START + offset)
    }

    #[concordium_test]
    fn test_price_decays_linearly() {
        let config = config(5, 1, 1000);
        let end = at(1000);

        claim_eq!(current_price(&config, at(0), end, at(0)), Amount::from_micro_ccd(5));
        claim_eq!(current_price(&config, at(0), end, at(250)), Amount::from_micro_ccd(4));
        claim_eq!(current_price(&config, at(0), end, at(500)), Amount::from_micro_ccd(3));
        // 999 * 4 / 1000 floors to 3
        claim_eq!(current_price(&config, at(0), end, at(999)), Amount::from_micro_ccd(2));
        claim_eq!(current_price(&config, at(0), end, at(1000)), Amount::from_micro_ccd(1));
        claim_eq!(current_price(&config, at(0), end, at(5000)), Amount::from_micro_ccd(1));
    }

    #[concordium_test]
    fn test_price_is_monotonic_and_bounded() {
        let configs = [
            config(1_000_000, 1, 7_919),
            config(123_456_789, 1_000, 86_400_000),
            config(10, 10, 500),
            config(u64::MAX, 0, 3_600_000),
        ];

        for config in configs.iter() {
            let end = at(config.duration.millis());
            let mut previous = config.start_price;
            for step in 0..=200u64 {
                let now = at(config.duration.millis() * step / 200);
                let price = current_price(config, at(0), end, now);
                claim!(price <= previous);
                claim!(price >= config.reserve_price);
                claim!(price <= config.start_price);
                previous = price;
            }
        }
    }

    #[concordium_test]
    fn test_price_after_extension_stays_at_reserve() {
        let config = config(5, 1, 1000);
        // Deadline pushed well past `start + duration`
        let end = at(1000 + EXTENSION_WINDOW_MILLIS);

        claim_eq!(current_price(&config, at(0), end, at(999)), Amount::from_micro_ccd(2));
        claim_eq!(current_price(&config, at(0), end, at(1000)), Amount::from_micro_ccd(1));
        claim_eq!(current_price(&config, at(0), end, at(200_000)), Amount::from_micro_ccd(1));
    }

    #[concordium_test]
    fn test_deadline_extension() {
        let end = at(EXTENSION_WINDOW_MILLIS * 10);

        // Outside the window the deadline is untouched
        claim_eq!(extended_deadline(end, at(0)), end);
        claim_eq!(
            extended_deadline(end, at(EXTENSION_WINDOW_MILLIS * 9)),
            end
        );

        // Inside the window it moves to `now + window`
        let late = at(EXTENSION_WINDOW_MILLIS * 9 + 1);
        claim_eq!(
            extended_deadline(end, late),
            at(EXTENSION_WINDOW_MILLIS * 10 + 1)
        );

        // Repeated late bids keep pushing it out
        let later = at(EXTENSION_WINDOW_MILLIS * 10);
        claim_eq!(
            extended_deadline(at(EXTENSION_WINDOW_MILLIS * 10 + 1), later),
            at(EXTENSION_WINDOW_MILLIS * 11)
        );
    }
}
