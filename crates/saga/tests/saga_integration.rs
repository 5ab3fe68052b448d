//! Integration tests for the stock reservation saga.

use std::sync::Arc;

use common::{AggregateId, CorrelationId, ProductId, UserId};
use domain::{ReservationLine, ReservationRequest, StockError, StockItem};
use events::{
    EventKind, InventoryReservationFailed, InventoryReserved, OrderCreated, OrderLine,
    StockReservation,
};
use messaging::{
    Dispatcher, Disposition, InMemoryPublisher, InboundMessage, OutboundMessage,
    RedeliveryPolicy,
};
use saga::{
    FailureReason, OrderCreatedHandler, ReservationOutcome, ReservationSaga, ReservationState,
    SagaError,
};
use stock_store::{InMemoryStockRepository, StockRepository};

type TestSaga = ReservationSaga<InMemoryStockRepository, InMemoryPublisher>;

struct TestHarness {
    saga: Arc<TestSaga>,
    repo: InMemoryStockRepository,
    publisher: InMemoryPublisher,
}

impl TestHarness {
    async fn with_stock(items: &[(&str, i64)]) -> Self {
        let repo = InMemoryStockRepository::new();
        for (id, total) in items {
            repo.insert(&StockItem::new(*id, *total).unwrap())
                .await
                .unwrap();
        }
        let publisher = InMemoryPublisher::new();
        let saga = Arc::new(ReservationSaga::new(repo.clone(), publisher.clone()));

        Self {
            saga,
            repo,
            publisher,
        }
    }

    async fn reserved(&self, id: &str) -> i64 {
        self.repo
            .get(&ProductId::new(id))
            .await
            .unwrap()
            .unwrap()
            .reserved_stock()
    }

    fn failures(&self) -> Vec<InventoryReservationFailed> {
        self.publisher.events()
    }

    fn successes(&self) -> Vec<InventoryReserved> {
        self.publisher.events()
    }
}

fn request(correlation: &str, lines: &[(&str, i64)]) -> ReservationRequest {
    ReservationRequest::new(
        CorrelationId::from(correlation),
        AggregateId::new(),
        lines
            .iter()
            .map(|(id, q)| ReservationLine::new(*id, *q))
            .collect(),
    )
}

#[tokio::test]
async fn scenario_a_reserves_and_emits_reserved() {
    let h = TestHarness::with_stock(&[("P1", 10)]).await;
    let req = request("corr-a", &[("P1", 4)]);

    let report = h.saga.execute(&req).await.unwrap();

    assert_eq!(report.state(), ReservationState::Succeeded);
    assert!(report.published);
    assert_eq!(report.attempts, 1);
    assert_eq!(h.reserved("P1").await, 4);

    let events = h.successes();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].order_id, req.order_id);
    assert_eq!(events[0].header.correlation_id.as_str(), "corr-a");
    assert_eq!(
        events[0].reservations,
        vec![StockReservation {
            product_id: ProductId::new("P1"),
            quantity: 4
        }]
    );
}

#[tokio::test]
async fn scenario_b_insufficient_stock_changes_nothing() {
    let h = TestHarness::with_stock(&[("P1", 10)]).await;
    h.saga.execute(&request("setup", &[("P1", 8)])).await.unwrap();
    h.publisher.clear();

    let report = h.saga.execute(&request("corr-b", &[("P1", 5)])).await.unwrap();

    assert_eq!(report.state(), ReservationState::Failed);
    assert_eq!(h.reserved("P1").await, 8);

    let failures = h.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].reason.contains("insufficient stock"));
    assert_eq!(failures[0].product_id, Some(ProductId::new("P1")));
    assert!(h.successes().is_empty());
}

#[tokio::test]
async fn scenario_c_unknown_product_leaves_valid_items_untouched() {
    let h = TestHarness::with_stock(&[("P1", 10), ("P2", 10)]).await;

    let report = h
        .saga
        .execute(&request("corr-c", &[("P1", 1), ("P9", 1), ("P2", 1)]))
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        ReservationOutcome::Failed(FailureReason::ProductNotFound(ProductId::new("P9")))
    );
    assert_eq!(h.reserved("P1").await, 0);
    assert_eq!(h.reserved("P2").await, 0);
    assert_eq!(h.repo.save_count(), 0);

    let failures = h.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].reason.contains("not found"));
}

#[tokio::test]
async fn scenario_d_save_failure_commits_nothing() {
    let h = TestHarness::with_stock(&[("P1", 10), ("P2", 10)]).await;
    h.repo.set_fail_on_save(true);

    let report = h
        .saga
        .execute(&request("corr-d", &[("P1", 2), ("P2", 3)]))
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        ReservationOutcome::Failed(FailureReason::SaveFailed)
    );
    h.repo.set_fail_on_save(false);
    assert_eq!(h.reserved("P1").await, 0);
    assert_eq!(h.reserved("P2").await, 0);

    let failures = h.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].reason.contains("save"));
}

#[tokio::test]
async fn scenario_e_fetch_failure_requeues_and_redelivery_runs_fresh_saga() {
    let h = TestHarness::with_stock(&[("P1", 10)]).await;
    let mut dispatcher = Dispatcher::new(RedeliveryPolicy::default());
    dispatcher
        .subscribe(
            EventKind::OrderCreated,
            Arc::new(OrderCreatedHandler::new(h.saga.clone())),
        )
        .unwrap();

    let order = OrderCreated::new(
        AggregateId::new(),
        UserId::new(),
        CorrelationId::from("corr-e"),
        vec![OrderLine::new("P1", 3, 5.0)],
    );
    let outbound = OutboundMessage::from_event(&order).unwrap();
    let message = InboundMessage::new(outbound.routing_key, outbound.body);

    h.repo.set_fail_on_fetch(true);
    assert_eq!(dispatcher.dispatch(&message).await, Disposition::Requeue);

    let failures = h.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].reason, "failed to fetch products");
    assert_eq!(failures[0].header.correlation_id.as_str(), "corr-e");

    // Store recovers, broker redelivers the same message.
    h.repo.set_fail_on_fetch(false);
    assert_eq!(h.reserved("P1").await, 0);
    let redelivered = message.clone().with_delivery_count(1);
    assert_eq!(dispatcher.dispatch(&redelivered).await, Disposition::Ack);

    let successes = h.successes();
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].header.correlation_id.as_str(), "corr-e");
    assert_eq!(successes[0].order_id, order.order_id);
    assert_eq!(h.reserved("P1").await, 3);
}

#[tokio::test]
async fn fetch_failure_is_reported_as_error_after_emitting_event() {
    let h = TestHarness::with_stock(&[("P1", 10)]).await;
    h.repo.set_fail_on_fetch(true);

    let err = h
        .saga
        .execute(&request("corr-f", &[("P1", 1)]))
        .await
        .unwrap_err();

    assert!(matches!(err, SagaError::Fetch(_)));
    assert_eq!(h.publisher.published().len(), 1);
}

#[tokio::test]
async fn multi_item_request_is_all_or_nothing() {
    let h = TestHarness::with_stock(&[("P1", 10), ("P2", 1), ("P3", 10)]).await;

    let report = h
        .saga
        .execute(&request("corr-g", &[("P1", 5), ("P2", 2), ("P3", 5)]))
        .await
        .unwrap();

    assert!(!report.outcome.is_success());
    for id in ["P1", "P2", "P3"] {
        assert_eq!(h.reserved(id).await, 0, "{id} was mutated");
    }

    let report = h
        .saga
        .execute(&request("corr-h", &[("P1", 5), ("P2", 1), ("P3", 5)]))
        .await
        .unwrap();

    assert!(report.outcome.is_success());
    assert_eq!(h.reserved("P1").await, 5);
    assert_eq!(h.reserved("P2").await, 1);
    assert_eq!(h.reserved("P3").await, 5);
}

#[tokio::test]
async fn inactive_product_fails_with_reason() {
    let h = TestHarness::with_stock(&[("P1", 10)]).await;
    let mut item = h.repo.get(&ProductId::new("P1")).await.unwrap().unwrap();
    item.set_active(false);
    h.repo.save_all(&[item]).await.unwrap();

    h.saga.execute(&request("corr-i", &[("P1", 1)])).await.unwrap();

    let failures = h.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(
        failures[0].reason,
        "cannot reserve product P1: product is not active"
    );
}

#[tokio::test]
async fn negative_line_fails_even_when_product_total_is_positive() {
    let h = TestHarness::with_stock(&[("A", 10)]).await;

    let report = h
        .saga
        .execute(&request("corr-neg", &[("A", 5), ("A", -3)]))
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        ReservationOutcome::Failed(FailureReason::CannotReserve {
            product_id: ProductId::new("A"),
            error: StockError::InvalidQuantity { quantity: -3 },
        })
    );
    assert_eq!(h.reserved("A").await, 0);
    assert!(h.successes().is_empty());
    assert_eq!(
        h.failures()[0].reason,
        "cannot reserve product A: quantity must be positive, got -3"
    );
}

#[tokio::test]
async fn empty_order_fails_without_touching_the_store() {
    let h = TestHarness::with_stock(&[("P1", 10)]).await;
    h.repo.set_fail_on_fetch(true);

    let report = h.saga.execute(&request("corr-j", &[])).await.unwrap();

    assert_eq!(
        report.outcome,
        ReservationOutcome::Failed(FailureReason::NoItems)
    );
    assert_eq!(report.attempts, 0);
    assert_eq!(h.failures()[0].reason, "order has no items");
}

#[tokio::test]
async fn every_run_emits_exactly_one_outcome_with_its_correlation_id() {
    let h = TestHarness::with_stock(&[("P1", 3)]).await;

    let requests = [
        request("r1", &[("P1", 1)]),
        request("r2", &[("P1", 5)]),
        request("r3", &[("nope", 1)]),
        request("r4", &[("P1", 2)]),
        request("r5", &[("P1", 1)]),
    ];

    for (i, req) in requests.iter().enumerate() {
        h.saga.execute(req).await.unwrap();
        let published = h.publisher.published();
        assert_eq!(published.len(), i + 1);
        assert_eq!(published[i].correlation_id, req.correlation_id.as_str());
    }

    // r1 and r4 fit, r5 finds nothing left.
    assert_eq!(h.reserved("P1").await, 3);
    assert_eq!(h.successes().len(), 2);
    assert_eq!(h.failures().len(), 3);
}

#[tokio::test]
async fn version_conflict_is_retried_with_fresh_stock() {
    let h = TestHarness::with_stock(&[("P1", 10)]).await;
    h.repo.fail_next_saves_with_conflict(2);

    let report = h.saga.execute(&request("corr-k", &[("P1", 4)])).await.unwrap();

    assert!(report.outcome.is_success());
    assert_eq!(report.attempts, 3);
    assert_eq!(h.reserved("P1").await, 4);
    assert_eq!(h.publisher.published().len(), 1);
}

#[tokio::test]
async fn persistent_conflict_gives_up_as_save_failure() {
    let h = TestHarness::with_stock(&[("P1", 10)]).await;
    h.repo.fail_next_saves_with_conflict(10);

    let report = h.saga.execute(&request("corr-l", &[("P1", 4)])).await.unwrap();

    assert_eq!(
        report.outcome,
        ReservationOutcome::Failed(FailureReason::SaveFailed)
    );
    assert_eq!(report.attempts, 3);
    assert_eq!(h.reserved("P1").await, 0);
}

#[tokio::test]
async fn publish_failure_after_commit_keeps_the_reservation() {
    let h = TestHarness::with_stock(&[("P1", 10)]).await;
    h.publisher.set_fail(true);

    let report = h.saga.execute(&request("corr-m", &[("P1", 2)])).await.unwrap();

    assert!(report.outcome.is_success());
    assert!(!report.published);
    assert_eq!(h.reserved("P1").await, 2);
}

#[tokio::test]
async fn concurrent_sagas_never_oversell() {
    let h = TestHarness::with_stock(&[("P1", 5)]).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let saga = h.saga.clone();
        handles.push(tokio::spawn(async move {
            saga.execute(&request(&format!("c{i}"), &[("P1", 1)]))
                .await
                .unwrap()
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().outcome.is_success() {
            succeeded += 1;
        }
    }

    let reserved = h.reserved("P1").await;
    assert!(reserved <= 5);
    assert_eq!(reserved, succeeded);
    assert_eq!(h.publisher.published().len(), 10);
}

#[tokio::test]
async fn poison_order_created_is_discarded() {
    let h = TestHarness::with_stock(&[("P1", 5)]).await;
    let mut dispatcher = Dispatcher::new(RedeliveryPolicy::default());
    dispatcher
        .subscribe(
            EventKind::OrderCreated,
            Arc::new(OrderCreatedHandler::new(h.saga.clone())),
        )
        .unwrap();

    let message = InboundMessage::new(
        "order.created",
        br#"{"event_type":"order.created","order_id":42}"#.to_vec(),
    );

    assert_eq!(dispatcher.dispatch(&message).await, Disposition::Discard);
    assert!(h.publisher.published().is_empty());
}
