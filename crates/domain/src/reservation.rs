//! Input of one reservation saga run.

use std::collections::HashMap;

use common::{AggregateId, CorrelationId, ProductId};
use serde::{Deserialize, Serialize};

/// Quantity of one product requested by an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationLine {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl ReservationLine {
    pub fn new(product_id: impl Into<ProductId>, quantity: i64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Stock an order wants reserved, all lines or none.
///
/// Transient: built from an inbound event, consumed by one saga run and
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub correlation_id: CorrelationId,
    pub order_id: AggregateId,
    pub lines: Vec<ReservationLine>,
}

impl ReservationRequest {
    pub fn new(
        correlation_id: CorrelationId,
        order_id: AggregateId,
        lines: Vec<ReservationLine>,
    ) -> Self {
        Self {
            correlation_id,
            order_id,
            lines,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Distinct product IDs, in order of first appearance.
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.quantities_by_product()
            .into_iter()
            .map(|(product_id, _)| product_id)
            .collect()
    }

    /// Requested quantity per product, summing lines that repeat a product.
    ///
    /// Products keep the order of their first line, so the first failing
    /// product during validation is the first one the order named.
    pub fn quantities_by_product(&self) -> Vec<(ProductId, i64)> {
        let mut positions: HashMap<&ProductId, usize> = HashMap::new();
        let mut totals: Vec<(ProductId, i64)> = Vec::new();

        for line in &self.lines {
            match positions.get(&line.product_id) {
                Some(&index) => {
                    totals[index].1 = totals[index].1.saturating_add(line.quantity);
                }
                None => {
                    positions.insert(&line.product_id, totals.len());
                    totals.push((line.product_id.clone(), line.quantity));
                }
            }
        }

        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(lines: Vec<ReservationLine>) -> ReservationRequest {
        ReservationRequest::new(CorrelationId::new(), AggregateId::new(), lines)
    }

    #[test]
    fn quantities_sum_repeated_products_in_first_seen_order() {
        let req = request(vec![
            ReservationLine::new("B", 2),
            ReservationLine::new("A", 1),
            ReservationLine::new("B", 3),
        ]);

        assert_eq!(
            req.quantities_by_product(),
            vec![(ProductId::new("B"), 5), (ProductId::new("A"), 1)]
        );
        assert_eq!(
            req.product_ids(),
            vec![ProductId::new("B"), ProductId::new("A")]
        );
    }

    #[test]
    fn empty_request() {
        let req = request(vec![]);
        assert!(req.is_empty());
        assert!(req.product_ids().is_empty());
    }
}
