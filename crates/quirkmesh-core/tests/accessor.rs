#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use quirkmesh_api::TransportErrorKind;
use quirkmesh_core::{
    AccessConfig, AccessKind, AdaptiveAccessor, AttemptOutcome, AttributeValue, CapabilitySpec,
    ClusterId, CoreError, DeviceId, DiagnosticRecord, Diagnostics, Operation, OperationKind,
    OperationSet, ReportingConfig, StrategyDescriptor, StrategyKind, Transport,
};
use tokio_util::sync::CancellationToken;

use common::{Reply, ScriptedTransport, malformed, transient, unsupported};

fn battery() -> CapabilitySpec {
    CapabilitySpec::new(
        "measure_battery",
        ClusterId::PowerConfiguration,
        0x0021,
        AccessKind::Report,
    )
    .with_strategies(vec![
        StrategyDescriptor::standard(),
        StrategyDescriptor::manufacturer_specific(0x1002),
        StrategyDescriptor::vendor_tunnel(4),
    ])
}

fn accessor(transport: &Arc<ScriptedTransport>, diagnostics: &Diagnostics) -> AdaptiveAccessor {
    AdaptiveAccessor::new(
        DeviceId::from("0x00158d0001"),
        Arc::clone(transport) as Arc<dyn Transport>,
        AccessConfig::default(),
        diagnostics.clone(),
    )
}

fn strategies(transport: &ScriptedTransport) -> Vec<StrategyKind> {
    transport.calls().iter().map(|c| c.strategy).collect()
}

// ── Cascade and memo ────────────────────────────────────────────────

#[tokio::test]
async fn winning_strategy_is_tried_first_next_time() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.always(OperationKind::Read, StrategyKind::Standard, unsupported());
    transport.always(OperationKind::Read, StrategyKind::ManufacturerSpecific, malformed());
    transport.always(
        OperationKind::Read,
        StrategyKind::VendorTunnel,
        Reply::Value(AttributeValue::Uint(87)),
    );
    let mut acc = accessor(&transport, &Diagnostics::new(64));
    let cancel = CancellationToken::new();
    let cap = battery();

    let first = acc.execute(&cap, &Operation::Read, &cancel).await.unwrap();
    assert_eq!(first.into_value(), Some(AttributeValue::Uint(87)));
    assert_eq!(transport.call_count(), 3);
    assert_eq!(acc.memoized_strategy("measure_battery", OperationKind::Read), Some(2));

    let second = acc.execute(&cap, &Operation::Read, &cancel).await.unwrap();
    assert_eq!(second.into_value(), Some(AttributeValue::Uint(87)));
    assert_eq!(transport.call_count(), 4);
    assert_eq!(strategies(&transport)[3], StrategyKind::VendorTunnel);
}

#[tokio::test]
async fn memoized_strategy_that_stops_working_falls_back_in_order() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.queue(OperationKind::Read, StrategyKind::Standard, vec![unsupported()]);
    transport.queue(
        OperationKind::Read,
        StrategyKind::ManufacturerSpecific,
        vec![unsupported()],
    );
    let mut acc = accessor(&transport, &Diagnostics::new(64));
    let cancel = CancellationToken::new();
    let cap = battery();

    acc.execute(&cap, &Operation::Read, &cancel).await.unwrap();
    assert_eq!(acc.memoized_strategy("measure_battery", OperationKind::Read), Some(2));

    // Tunnel breaks; the standard frame works again.
    transport.always(OperationKind::Read, StrategyKind::VendorTunnel, unsupported());
    acc.execute(&cap, &Operation::Read, &cancel).await.unwrap();

    assert_eq!(
        strategies(&transport),
        vec![
            StrategyKind::Standard,
            StrategyKind::ManufacturerSpecific,
            StrategyKind::VendorTunnel,
            StrategyKind::VendorTunnel,
            StrategyKind::Standard,
        ]
    );
    assert_eq!(acc.memoized_strategy("measure_battery", OperationKind::Read), Some(0));
}

#[tokio::test]
async fn memo_is_per_operation_target_not_global() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.always(OperationKind::Read, StrategyKind::Standard, unsupported());
    let mut acc = accessor(&transport, &Diagnostics::new(64));
    let cancel = CancellationToken::new();

    let cap = CapabilitySpec::new("onoff", ClusterId::OnOff, 0, AccessKind::Read).with_strategies(
        vec![StrategyDescriptor::standard(), StrategyDescriptor::vendor_tunnel(1)],
    );
    acc.execute(&cap, &Operation::Read, &cancel).await.unwrap();
    assert_eq!(acc.memoized_strategy("onoff", OperationKind::Read), Some(1));
    assert_eq!(acc.memoized_strategy("measure_battery", OperationKind::Read), None);
}

#[tokio::test]
async fn failed_report_configuration_keeps_the_read_winner() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.always(OperationKind::Read, StrategyKind::Standard, unsupported());
    transport.always(OperationKind::Read, StrategyKind::ManufacturerSpecific, unsupported());
    transport.always(
        OperationKind::Read,
        StrategyKind::VendorTunnel,
        Reply::Value(AttributeValue::Uint(5)),
    );
    for strategy in [
        StrategyKind::Standard,
        StrategyKind::ManufacturerSpecific,
        StrategyKind::VendorTunnel,
    ] {
        transport.always(OperationKind::ConfigureReport, strategy, unsupported());
    }
    let mut acc = accessor(&transport, &Diagnostics::new(64));
    let cancel = CancellationToken::new();
    let cap = battery();

    acc.execute(&cap, &Operation::Read, &cancel).await.unwrap();
    assert_eq!(acc.memoized_strategy("measure_battery", OperationKind::Read), Some(2));

    let err = acc
        .execute(
            &cap,
            &Operation::ConfigureReport(ReportingConfig::default()),
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::UnsupportedOperation { .. }));
    assert_eq!(acc.memoized_strategy("measure_battery", OperationKind::Read), Some(2));

    let before = transport.calls_of(OperationKind::Read).len();
    let value = acc.execute(&cap, &Operation::Read, &cancel).await.unwrap();
    assert_eq!(value.into_value(), Some(AttributeValue::Uint(5)));
    let reads = transport.calls_of(OperationKind::Read);
    assert_eq!(reads.len() - before, 1);
    assert_eq!(reads.last().unwrap().strategy, StrategyKind::VendorTunnel);
}

#[tokio::test]
async fn invalidation_restarts_from_the_declared_order() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.queue(OperationKind::Read, StrategyKind::Standard, vec![unsupported()]);
    transport.queue(
        OperationKind::Read,
        StrategyKind::ManufacturerSpecific,
        vec![unsupported()],
    );
    let mut acc = accessor(&transport, &Diagnostics::new(64));
    let cancel = CancellationToken::new();
    let cap = battery();
    acc.execute(&cap, &Operation::Read, &cancel).await.unwrap();
    acc.execute(&cap, &Operation::Write(AttributeValue::Uint(1)), &cancel)
        .await
        .unwrap();
    assert_eq!(acc.invalidate("measure_battery"), 2);
    assert_eq!(acc.invalidate("measure_battery"), 0);

    acc.execute(&cap, &Operation::Read, &cancel).await.unwrap();
    assert_eq!(strategies(&transport).last(), Some(&StrategyKind::Standard));
    assert_eq!(acc.memoized_strategy("measure_battery", OperationKind::Read), Some(0));
}

// ── Retry and backoff ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_the_same_strategy_with_backoff() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.queue(
        OperationKind::Read,
        StrategyKind::Standard,
        vec![transient(), transient()],
    );
    let mut acc = accessor(&transport, &Diagnostics::new(64));

    let out = acc
        .execute(&battery(), &Operation::Read, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(out.into_value(), Some(AttributeValue::Bool(true)));

    let calls = transport.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| c.strategy == StrategyKind::Standard));

    let first_gap = calls[1].at - calls[0].at;
    let second_gap = calls[2].at - calls[1].at;
    assert!(first_gap >= Duration::from_millis(500) && first_gap < Duration::from_millis(600));
    assert!(second_gap >= Duration::from_millis(1000) && second_gap < Duration::from_millis(1100));
}

#[tokio::test(start_paused = true)]
async fn persistent_transient_failures_end_as_transient_network() {
    let transport = Arc::new(ScriptedTransport::new());
    let cap = CapabilitySpec::new("onoff", ClusterId::OnOff, 0, AccessKind::Read).with_strategies(
        vec![StrategyDescriptor::standard(), StrategyDescriptor::vendor_tunnel(1)],
    );
    transport.always(OperationKind::Read, StrategyKind::Standard, transient());
    transport.always(OperationKind::Read, StrategyKind::VendorTunnel, transient());
    let mut acc = accessor(&transport, &Diagnostics::new(64));

    let err = acc
        .execute(&cap, &Operation::Read, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::TransientNetwork { .. }), "{err:?}");
    // One try plus three retries per strategy.
    assert_eq!(transport.call_count(), 8);
    assert_eq!(acc.memoized_strategy("onoff", OperationKind::Read), None);
}

// ── Terminal errors ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn unsupported_last_error_maps_to_unsupported_operation() {
    let transport = Arc::new(ScriptedTransport::new());
    let cap = CapabilitySpec::new("onoff", ClusterId::OnOff, 0, AccessKind::Read).with_strategies(
        vec![StrategyDescriptor::standard(), StrategyDescriptor::vendor_tunnel(1)],
    );
    transport.always(OperationKind::Read, StrategyKind::Standard, transient());
    transport.always(OperationKind::Read, StrategyKind::VendorTunnel, unsupported());
    let mut acc = accessor(&transport, &Diagnostics::new(64));

    let err = acc
        .execute(&cap, &Operation::Read, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            CoreError::UnsupportedOperation {
                operation: OperationKind::Read,
                ..
            }
        ),
        "{err:?}"
    );
}

#[tokio::test]
async fn malformed_last_error_maps_to_permanent_device() {
    let transport = Arc::new(ScriptedTransport::new());
    for kind in [
        StrategyKind::Standard,
        StrategyKind::ManufacturerSpecific,
        StrategyKind::VendorTunnel,
    ] {
        transport.always(OperationKind::Read, kind, malformed());
    }
    let mut acc = accessor(&transport, &Diagnostics::new(64));

    let err = acc
        .execute(&battery(), &Operation::Read, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermanentDevice { .. }), "{err:?}");
    // Strategy mismatches are not retried.
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test]
async fn undeclared_operation_never_reaches_the_transport() {
    let transport = Arc::new(
        ScriptedTransport::new().with_supported(OperationSet::all().without(OperationKind::Write)),
    );
    let mut acc = accessor(&transport, &Diagnostics::new(64));
    let cap = CapabilitySpec::new("onoff", ClusterId::OnOff, 0, AccessKind::Write);

    let err = acc
        .execute(
            &cap,
            &Operation::Write(AttributeValue::Bool(true)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::UnsupportedOperation {
            operation: OperationKind::Write,
            ..
        }
    ));
    assert_eq!(transport.call_count(), 0);
}

// ── Timeouts and cancellation ───────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn slow_strategy_times_out_and_cascade_moves_on() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.delay(OperationKind::Read, Duration::from_secs(1));
    let cap = CapabilitySpec::new("onoff", ClusterId::OnOff, 0, AccessKind::Read).with_strategies(
        vec![
            StrategyDescriptor::standard().with_timeout(Duration::from_millis(100)),
            StrategyDescriptor::vendor_tunnel(1),
        ],
    );
    let diagnostics = Diagnostics::new(64);
    let mut rx = diagnostics.subscribe();
    let mut acc = accessor(&transport, &diagnostics);

    acc.execute(&cap, &Operation::Read, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        strategies(&transport),
        vec![StrategyKind::Standard, StrategyKind::VendorTunnel]
    );
    let first = rx.recv().await.unwrap();
    let DiagnosticRecord::Attempt(attempt) = &first.record else {
        panic!("expected an attempt record");
    };
    assert_eq!(attempt.error_kind, Some(TransportErrorKind::Timeout));
}

#[tokio::test]
async fn canceled_token_stops_before_first_attempt() {
    let transport = Arc::new(ScriptedTransport::new());
    let mut acc = accessor(&transport, &Diagnostics::new(64));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = acc
        .execute(&battery(), &Operation::Read, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, CoreError::Canceled);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_backoff() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.always(OperationKind::Read, StrategyKind::Standard, transient());
    let mut acc = accessor(&transport, &Diagnostics::new(64));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let err = acc
        .execute(&battery(), &Operation::Read, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, CoreError::Canceled);
    assert_eq!(transport.call_count(), 1);
}

// ── Diagnostics ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn every_attempt_is_recorded_under_one_operation_id() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.queue(OperationKind::Read, StrategyKind::Standard, vec![transient()]);
    transport.always(OperationKind::Read, StrategyKind::Standard, unsupported());
    let diagnostics = Diagnostics::new(64);
    let mut rx = diagnostics.subscribe();
    let mut acc = accessor(&transport, &diagnostics);

    acc.execute(&battery(), &Operation::Read, &CancellationToken::new())
        .await
        .unwrap();

    let mut attempts = Vec::new();
    while let Ok(record) = rx.try_recv() {
        if let DiagnosticRecord::Attempt(attempt) = &record.record {
            attempts.push(attempt.clone());
        }
    }
    assert_eq!(attempts.len(), transport.call_count());
    assert_eq!(attempts.len(), 3);

    let summary: Vec<_> = attempts
        .iter()
        .map(|a| (a.strategy_index, a.retry, a.outcome, a.error_kind))
        .collect();
    assert_eq!(
        summary,
        vec![
            (0, 0, AttemptOutcome::Failure, Some(TransportErrorKind::TransientNetwork)),
            (0, 1, AttemptOutcome::Failure, Some(TransportErrorKind::Unsupported)),
            (1, 0, AttemptOutcome::Success, None),
        ]
    );
    assert!(attempts.iter().all(|a| a.operation_id == attempts[0].operation_id));
    assert!(attempts.iter().all(|a| a.capability == "measure_battery"));
    assert_eq!(diagnostics.emitted(), 3);
}
