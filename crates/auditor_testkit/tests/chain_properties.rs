//! Property tests over whole ledgers.

use auditor_core::{BackendKind, Deadline, Store};
use auditor_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn any_batch_forms_valid_document_chain(batch in event_batch_strategy(1, 12)) {
        let ledger = TestLedger::memory(BackendKind::Document);
        for mut event in batch.clone() {
            ledger.save(&mut event).unwrap();
        }
        let report = ledger.verify(None, 5, Deadline::never()).unwrap();
        prop_assert!(report.is_valid(), "{:?}", report.issues);
        prop_assert_eq!(report.checked, batch.len());
    }

    #[test]
    fn partitions_chain_independently(batch in event_batch_strategy(1, 12)) {
        let ledger = TestLedger::memory(BackendKind::Partitioned);
        for mut event in batch.clone() {
            ledger.save(&mut event).unwrap();
        }

        let mut customers: Vec<_> = batch.iter().map(|e| e.customer.clone()).collect();
        customers.sort();
        customers.dedup();

        let mut checked = 0;
        for customer in &customers {
            let cursor = ledger.first_page(customer);
            let report = ledger.verify(cursor.as_ref(), 5, Deadline::never()).unwrap();
            prop_assert!(report.is_valid(), "{}: {:?}", customer, report.issues);

            let newest = ledger.read(1, cursor.as_ref()).unwrap();
            prop_assert_eq!(newest.len(), 1);
            checked += report.checked;
        }
        prop_assert_eq!(checked, batch.len());
    }

    #[test]
    fn saved_events_are_read_back_newest_first(batch in event_batch_strategy(2, 10)) {
        let ledger = TestLedger::memory(BackendKind::Document);
        let mut saved = Vec::new();
        for mut event in batch {
            ledger.save(&mut event).unwrap();
            saved.push(event);
        }
        saved.reverse();

        let read = ledger.read(0, None).unwrap();
        prop_assert_eq!(read.len(), saved.len());
        for (got, want) in read.iter().zip(&saved) {
            prop_assert_eq!(&got.hash, &want.hash);
            prop_assert_eq!(&got.event, &want.event);
        }
    }
}

#[test]
fn file_ledger_survives_reopen() {
    let ledger = TestLedger::file(BackendKind::Partitioned);
    for i in 0..5 {
        ledger.save(&mut sample_event("acme", i)).unwrap();
    }
    let ledger = ledger.reopen();
    let cursor = ledger.first_page("acme");
    assert_eq!(ledger.read(0, cursor.as_ref()).unwrap().len(), 5);
    assert!(ledger.verify(cursor.as_ref(), 2, Deadline::never()).unwrap().is_valid());
}

#[test]
fn populated_ledger_has_chain_per_customer() {
    let ledger = scenarios::populated_ledger(BackendKind::Partitioned, &["acme", "globex"], 3);
    for customer in ["acme", "globex"] {
        let cursor = ledger.first_page(customer);
        let events = ledger.read(0, cursor.as_ref()).unwrap();
        assert_eq!(events.len(), 3);
        assert!(events[2].previous_hash.is_empty());
    }
}

#[test]
fn stress_outcome_summarizes_chains() {
    let outcome = stress_concurrent_appends(
        BackendKind::Partitioned,
        &StressConfig {
            appends_per_thread: 10,
            threads: 2,
            customers: vec!["acme".into()],
        },
    );
    outcome.result.print_summary("partitioned appends");
    assert_eq!(outcome.result.successful_ops, 20);
    assert!(outcome.all_valid());
}
