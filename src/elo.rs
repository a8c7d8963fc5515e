//! Elo rating delta (spec §4.5).
//!
//! `E = 1 / (1 + 10^((R_opp - R_self)/400))`, `delta = round(K * (S - E), 1)`.

pub const WIN: f64 = 1.0;
pub const DRAW: f64 = 0.5;
pub const LOSS: f64 = 0.0;

/// Expected score for `self_rating` against `opp_rating` under the logistic model.
pub fn expected_score(self_rating: f64, opp_rating: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opp_rating - self_rating) / 400.0))
}

/// Rating delta for a player, rounded to one decimal place.
pub fn rating_delta(self_rating: f64, opp_rating: f64, result: f64, k: f64) -> f64 {
    let e = expected_score(self_rating, opp_rating);
    round1(k * (result - e))
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_ratings_even_draw_is_zero() {
        assert_eq!(rating_delta(1000.0, 1000.0, DRAW, 32.0), 0.0);
    }

    #[test]
    fn win_against_equal_rating_is_half_k() {
        assert_eq!(rating_delta(1000.0, 1000.0, WIN, 32.0), 16.0);
    }

    #[test]
    fn symmetry_law() {
        // delta(R_a, R_b, WIN) == -delta(R_b, R_a, LOSS)
        let a = rating_delta(1200.0, 1000.0, WIN, 32.0);
        let b = rating_delta(1000.0, 1200.0, LOSS, 32.0);
        assert_eq!(a, -b);
    }

    #[test]
    fn settlement_zero_sum_when_ratings_equal() {
        let win = rating_delta(1000.0, 1000.0, WIN, 32.0);
        let loss = rating_delta(1000.0, 1000.0, LOSS, 32.0);
        assert_eq!(win + loss, 0.0);
    }
}
