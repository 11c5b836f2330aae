use regcheck_core::pricing::round_cost;
use regcheck_core::{CostEstimate, PriceTable};

use crate::parse::RawCall;

/// Price every call. Each record carries its own cost rounded to 6 places;
/// the total is the rounded sum of the unrounded per-call costs.
pub fn price_calls(prices: &PriceTable, calls: Vec<RawCall>) -> (Vec<CostEstimate>, f64) {
    let mut total = 0.0;
    let priced = calls
        .into_iter()
        .map(|call| {
            let cost = prices.cost(
                &call.model,
                call.estimated_input_tokens,
                call.estimated_output_tokens,
            );
            total += cost;
            CostEstimate {
                start_line: call.start_line,
                end_line: call.end_line.unwrap_or(call.start_line),
                model: call.model,
                estimated_input_tokens: call.estimated_input_tokens,
                estimated_output_tokens: call.estimated_output_tokens,
                call_type: call.call_type,
                description: call.description,
                estimated_cost: round_cost(cost),
            }
        })
        .collect();
    (priced, round_cost(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regcheck_core::ModelPrice;
    use std::collections::BTreeMap;

    fn call(model: &str, input: u64, output: u64) -> RawCall {
        RawCall {
            start_line: 1,
            end_line: None,
            model: model.to_string(),
            estimated_input_tokens: input,
            estimated_output_tokens: output,
            call_type: "chat".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn total_is_sum_of_per_call_costs() {
        let table = PriceTable::new(BTreeMap::from([
            ("default".to_string(), ModelPrice::new(0.002, 0.002)),
            ("big".to_string(), ModelPrice::new(0.01, 0.03)),
        ]))
        .unwrap();

        let (priced, total) = price_calls(
            &table,
            vec![call("big", 2000, 1000), call("small", 500, 500)],
        );
        // big: 2 * 0.01 + 1 * 0.03 = 0.05; small (default): 0.5 * 0.002 * 2 = 0.002
        assert_eq!(priced[0].estimated_cost, 0.05);
        assert_eq!(priced[1].estimated_cost, 0.002);
        assert_eq!(total, 0.052);
        assert_eq!(priced[0].end_line, 1);
    }

    #[test]
    fn tiny_costs_round_to_six_places() {
        let table = PriceTable::builtin();
        let (priced, total) = price_calls(&table, vec![call("text-embedding-3-small", 7, 0)]);
        // 0.007 * 0.00002 = 1.4e-7
        assert_eq!(priced[0].estimated_cost, 0.0);
        assert_eq!(total, 0.0);
    }

    #[test]
    fn no_calls_cost_nothing() {
        let (priced, total) = price_calls(&PriceTable::builtin(), vec![]);
        assert!(priced.is_empty());
        assert_eq!(total, 0.0);
    }
}
