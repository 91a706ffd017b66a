//! Moving-average crossover profit used as the genetic fitness.
//!
//! Short and long simple moving averages are compared index by index. A rise of
//! the comparison sign is a buy, a fall is a sell. Buy and sell prices are
//! paired in order of occurrence and the first pair is dropped as warm-up.

use super::genotype::Genotype;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossoverSignal {
    Buy,
    Sell,
}

/// Simple moving average; positions before the window is full are 0.0.
///
/// A zero window or a window longer than the series yields all zeros.
pub fn moving_average(window: usize, prices: &[f64]) -> Vec<f64> {
    let mut averages = vec![0.0; prices.len()];
    if window == 0 || window > prices.len() {
        return averages;
    }

    let divisor = window as f64;
    for (offset, slice) in prices.windows(window).enumerate() {
        averages[offset + window - 1] = slice.iter().sum::<f64>() / divisor;
    }
    averages
}

/// Sign of `short_ma - long_ma` per index, in {-1, 0, 1}.
pub fn crossover_signs(short_window: usize, long_window: usize, prices: &[f64]) -> Vec<i8> {
    let short_ma = moving_average(short_window, prices);
    let long_ma = moving_average(long_window, prices);

    short_ma
        .iter()
        .zip(&long_ma)
        .map(|(short, long)| match short.partial_cmp(long) {
            Some(Ordering::Greater) => 1,
            Some(Ordering::Less) => -1,
            _ => 0,
        })
        .collect()
}

/// Signal per index. Index 0 never signals.
pub fn crossover_signals(
    short_window: usize,
    long_window: usize,
    prices: &[f64],
) -> Vec<Option<CrossoverSignal>> {
    let signs = crossover_signs(short_window, long_window, prices);

    let mut signals = vec![None; signs.len()];
    for i in 1..signs.len() {
        signals[i] = match signs[i].cmp(&signs[i - 1]) {
            Ordering::Greater => Some(CrossoverSignal::Buy),
            Ordering::Less => Some(CrossoverSignal::Sell),
            Ordering::Equal => None,
        };
    }
    signals
}

/// Signal produced by the most recent price, if any.
pub fn latest_signal(
    short_window: usize,
    long_window: usize,
    prices: &[f64],
) -> Option<CrossoverSignal> {
    crossover_signals(short_window, long_window, prices)
        .last()
        .copied()
        .flatten()
}

/// Realized profit of trading the crossover of the two windows over `prices`.
pub fn fitness(short_window: usize, long_window: usize, prices: &[f64]) -> f64 {
    if short_window == 0
        || long_window == 0
        || short_window > prices.len()
        || long_window > prices.len()
    {
        return 0.0;
    }

    let signals = crossover_signals(short_window, long_window, prices);

    let mut buys = Vec::new();
    let mut sells = Vec::new();
    for (signal, price) in signals.iter().zip(prices) {
        match signal {
            Some(CrossoverSignal::Buy) => buys.push(*price),
            Some(CrossoverSignal::Sell) => sells.push(*price),
            None => {}
        }
    }

    // the first pair is warm-up and never counts
    buys.iter()
        .zip(&sells)
        .skip(1)
        .map(|(buy, sell)| sell - buy)
        .sum()
}

pub fn genotype_fitness(genotype: &Genotype, prices: &[f64]) -> f64 {
    fitness(
        genotype.short_window as usize,
        genotype.long_window as usize,
        prices,
    )
}
