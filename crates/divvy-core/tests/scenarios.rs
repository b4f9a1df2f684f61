use divvy_core::{
    AccountId, DividendPool, LedgerConfig, LedgerError, LedgerEvent, MemoryPayout, PoolOp,
    RefusingPayout, StakeView,
};

fn id(s: &str) -> AccountId {
    s.to_string()
}

fn pool() -> DividendPool<MemoryPayout> {
    DividendPool::new(&LedgerConfig::default(), MemoryPayout::default())
}

#[test]
fn transfer_between_distributions() {
    let mut p = pool();
    let (a, b) = (id("a"), id("b"));
    p.mint(&a, 100).unwrap();

    p.distribute(&id("treasury"), 100).unwrap();
    assert_eq!(p.entitlement_total(&a).unwrap(), 100);

    // Earned dividends stay with the sender; the receiver held nothing
    // during the first distribution.
    p.transfer(&a, &b, 50).unwrap();
    assert_eq!(p.entitlement_total(&a).unwrap(), 100);
    assert_eq!(p.entitlement_total(&b).unwrap(), 0);

    p.distribute(&id("treasury"), 100).unwrap();
    assert_eq!(p.entitlement_total(&a).unwrap(), 150);
    assert_eq!(p.entitlement_total(&b).unwrap(), 50);

    assert_eq!(p.withdraw(&a).unwrap(), 150);
    assert_eq!(p.withdrawable(&a).unwrap(), 0);
    assert_eq!(p.withdraw(&a).unwrap(), 0);
    assert_eq!(p.payout().paid_to(&a), 150);
    assert_eq!(p.withdrawable(&b).unwrap(), 50);
    p.check_invariants().unwrap();
}

#[test]
fn failing_payout_keeps_entitlement() {
    let mut p = DividendPool::new(&LedgerConfig::default(), RefusingPayout);
    let a = id("a");
    p.mint(&a, 100).unwrap();
    p.distribute(&id("treasury"), 100).unwrap();
    assert_eq!(p.withdrawable(&a).unwrap(), 100);

    assert_eq!(p.withdraw(&a).unwrap(), 0);
    assert_eq!(p.withdrawable(&a).unwrap(), 100);
    assert_eq!(p.withdrawn_total(&a), 0);
    assert!(p
        .events()
        .iter()
        .all(|e| !matches!(e, LedgerEvent::Withdrawn { .. })));
}

#[test]
fn budget_below_payout_cost_rolls_back_then_retry_succeeds() {
    let config = LedgerConfig::from_toml_str(
        r#"
        payout_budget = 1000
        [payout]
        cost_per_payout = 2100
        "#,
    )
    .unwrap();
    let mut p = DividendPool::new(&config, MemoryPayout::new(config.payout.clone()));
    let a = id("a");
    p.mint(&a, 10).unwrap();
    p.distribute(&id("treasury"), 70).unwrap();

    assert_eq!(p.withdraw(&a).unwrap(), 0);
    assert_eq!(p.withdrawable(&a).unwrap(), 70);

    p.set_payout_budget(divvy_core::PayoutBudget(2_100));
    assert_eq!(p.withdraw(&a).unwrap(), 70);
    assert_eq!(p.withdraw(&a).unwrap(), 0);
}

#[test]
fn zero_stake_distribution_is_rejected_without_side_effects() {
    let mut p = pool();
    let root = p.state_root();
    assert_eq!(p.distribute(&id("treasury"), 500), Err(LedgerError::NoStakeholders));
    assert_eq!(p.state_root(), root);
    assert_eq!(p.total_distributed(), 0);
    assert!(p.events().is_empty());
}

#[test]
fn events_only_for_nonzero_effects() {
    let mut p = pool();
    let a = id("a");
    p.mint(&a, 1).unwrap();
    p.distribute(&id("treasury"), 0).unwrap();
    assert_eq!(p.withdraw(&a).unwrap(), 0);
    assert!(p.events().is_empty());

    p.distribute(&id("treasury"), 9).unwrap();
    p.withdraw(&a).unwrap();
    assert_eq!(
        p.drain_events(),
        vec![
            LedgerEvent::Distributed {
                initiator: id("treasury"),
                amount: 9
            },
            LedgerEvent::Withdrawn {
                account: a.clone(),
                amount: 9
            },
        ]
    );
    assert!(p.events().is_empty());
}

#[test]
fn remainder_is_forfeited_not_carried() {
    let mut p = pool();
    for name in ["a", "b", "c"] {
        p.mint(&id(name), 1).unwrap();
    }
    p.distribute(&id("treasury"), 10).unwrap();
    let entitled: u64 = ["a", "b", "c"]
        .iter()
        .map(|n| p.entitlement_total(&id(n)).unwrap())
        .sum();
    assert_eq!(entitled, 9);
    assert_eq!(p.total_distributed(), 10);

    // A second, equally lossy round does not pick up the first remainder.
    p.distribute(&id("treasury"), 10).unwrap();
    assert_eq!(p.entitlement_total(&id("a")).unwrap(), 6);
    p.check_invariants().unwrap();
}

#[test]
fn disabled_transfers_leave_mint_and_burn_working() {
    let config = LedgerConfig {
        allow_transfers: false,
        ..LedgerConfig::default()
    };
    let mut p = DividendPool::new(&config, MemoryPayout::default());
    let (a, b) = (id("a"), id("b"));
    p.mint(&a, 10).unwrap();
    p.distribute(&id("treasury"), 10).unwrap();
    assert_eq!(p.transfer(&a, &b, 5), Err(LedgerError::TransfersDisabled));
    assert_eq!(p.balance_of(&a), 10);
    p.transfer(&a, &a, 5).unwrap();

    p.burn(&a, 5).unwrap();
    p.mint(&b, 5).unwrap();
    p.distribute(&id("treasury"), 10).unwrap();
    assert_eq!(p.entitlement_total(&a).unwrap(), 15);
    assert_eq!(p.entitlement_total(&b).unwrap(), 5);
}

#[test]
fn full_width_distribution_then_overflow_changes_nothing() {
    let mut p = pool();
    let a = id("a");
    p.mint(&a, 1).unwrap();
    p.distribute(&id("treasury"), u64::MAX).unwrap();
    assert_eq!(p.entitlement_total(&a).unwrap(), u64::MAX);

    let root = p.state_root();
    let err = p.distribute(&id("treasury"), 1).unwrap_err();
    assert_eq!(err, LedgerError::ArithmeticOverflow("total distributed"));
    assert!(err.is_fatal());
    assert_eq!(p.state_root(), root);
    assert_eq!(p.events().len(), 1);

    // Stake changes after a full-width distribution stay representable.
    p.mint(&id("b"), u64::MAX - 1).unwrap();
    p.burn(&a, 1).unwrap();
    assert_eq!(p.withdraw(&a).unwrap(), u64::MAX);
    p.check_invariants().unwrap();
}

#[test]
fn set_balance_tracks_external_holdings() {
    let mut p = pool();
    let (a, b) = (id("a"), id("b"));
    let ops = vec![
        PoolOp::SetBalance {
            account: a.clone(),
            balance: 30,
        },
        PoolOp::SetBalance {
            account: b.clone(),
            balance: 10,
        },
        PoolOp::Distribute {
            initiator: id("treasury"),
            amount: 40,
        },
        PoolOp::SetBalance {
            account: a.clone(),
            balance: 10,
        },
        PoolOp::Distribute {
            initiator: id("treasury"),
            amount: 20,
        },
    ];
    for op in &ops {
        p.apply(op).unwrap();
    }
    assert_eq!(p.entitlement_total(&a).unwrap(), 40);
    assert_eq!(p.entitlement_total(&b).unwrap(), 20);
    assert_eq!(p.total_stake(), 20);
}
