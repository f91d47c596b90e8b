//! # End-to-End Scenarios
//!
//! Four validators A, B, C, D (sorted by address) on top of the shared
//! pre-chain. With round robin the proposers of height 11 are B, C, D for
//! rounds 0, 1, 2.

use super::cluster::{Cluster, REQUEST_TIMEOUT};
use ibft_consensus::{MessageCode, Proposal, State, View};
use std::time::Duration;

const A: usize = 0;
const B: usize = 1;
const C: usize = 2;
const D: usize = 3;

fn assert_vrank_view(cluster: &Cluster, view: View) {
    for (index, node) in cluster.nodes.iter().enumerate() {
        let report = node.core.stats().last_vrank.as_ref();
        assert_eq!(report.map(|report| report.view), Some(view), "node {index}");
    }
}

#[test]
fn test_happy_path_four_validators() {
    let mut cluster = Cluster::new(4);
    assert_eq!(cluster.proposer_index(0), B);

    let proposal = cluster.request(B, b"P");
    cluster.run_until_idle();

    let block = cluster.assert_agreement(11);
    assert_eq!(block.hash(), proposal.hash());
    assert!(cluster.seal_signers(&block).len() >= 3);
    for node in &cluster.nodes {
        assert_eq!(node.core.current_view(), View::new(12, 0));
        assert_eq!(node.core.locked_hash(), None);
        assert_eq!(node.core.stats().commits, 1);
        assert_eq!(node.core.stats().rounds_changed, 0);
    }
    assert_vrank_view(&cluster, View::new(11, 0));
}

#[test]
fn test_silent_proposer_is_replaced() {
    let mut cluster = Cluster::new(4);
    // C will propose at round 1
    let proposal = cluster.request(C, b"P-round-1");
    assert_eq!(
        cluster.nodes[A].timers.armed_round_change(),
        Some((View::new(11, 1), REQUEST_TIMEOUT + Duration::from_secs(1)))
    );

    // B never proposes; everyone else times out
    for index in [A, C, D] {
        assert_eq!(cluster.fire_round_change(index), Some(View::new(11, 1)));
        cluster.run_until_idle();
    }

    let block = cluster.assert_agreement(11);
    assert_eq!(block.hash(), proposal.hash());
    assert_eq!(block.header.proposer, cluster.nodes[C].address);
    for node in &cluster.nodes {
        assert_eq!(node.core.stats().rounds_changed, 1);
    }
    assert_vrank_view(&cluster, View::new(11, 1));
}

#[test]
fn test_locked_nodes_repropose_locked_proposal() {
    let mut cluster = Cluster::new(4);
    let c = cluster.nodes[C].address;
    let rival = cluster.request(C, b"P1-prime");

    // Round 0: C is cut off and no Commit gets through
    cluster
        .network
        .set_filter(move |origin, to, code| code != MessageCode::Commit && *origin != c && *to != c);
    let locked = cluster.request(B, b"P1");
    cluster.run_until_idle();

    for index in [A, B, D] {
        let node = &cluster.nodes[index];
        assert_eq!(node.core.state(), State::Prepared, "node {index}");
        assert_eq!(node.core.locked_hash(), Some(locked.hash()), "node {index}");
    }
    assert_eq!(cluster.nodes[C].core.state(), State::AcceptRequest);
    assert_eq!(cluster.heights(), vec![10; 4]);

    // Partition heals; round 1 belongs to C, round 2 to D
    cluster.network.clear_filter();
    for index in [A, B, C] {
        cluster.fire_round_change(index);
        cluster.run_until_idle();
        if index == A {
            assert_eq!(cluster.nodes[A].core.current_view(), View::new(11, 1));
            assert_eq!(cluster.nodes[A].core.locked_hash(), Some(locked.hash()));
        }
    }

    let block = cluster.assert_agreement(11);
    assert_eq!(block.hash(), locked.hash());
    assert_ne!(block.hash(), rival.hash());
    assert_vrank_view(&cluster, View::new(11, 2));
}

#[test]
fn test_equivocating_proposer_commits_nothing_in_its_round() {
    let mut cluster = Cluster::new(4);
    let b = cluster.nodes[B].address;
    let fallback = cluster.request(C, b"P2");

    // B's own transport is muted; it talks only through crafted payloads
    cluster
        .network
        .set_filter(move |origin, _, code| !(code == MessageCode::Preprepare && *origin == b));
    let view = View::new(11, 0);
    let first = cluster.build_block(B, b"P");
    let second = cluster.build_block(B, b"P-prime");
    assert_ne!(first.hash(), second.hash());
    cluster.inject(A, cluster.preprepare(B, view, &first));
    cluster.inject(C, cluster.preprepare(B, view, &first));
    cluster.inject(D, cluster.preprepare(B, view, &second));
    cluster.run_until_idle();

    assert_eq!(cluster.heights(), vec![10; 4]);
    for node in &cluster.nodes {
        assert!(node.core.state() < State::Prepared);
        assert_eq!(node.core.locked_hash(), None);
    }
    let prepares = cluster.nodes[A].core.round_state().unwrap().prepares().size();
    assert_eq!(prepares, 2);

    cluster.network.clear_filter();
    for index in [A, B, C] {
        cluster.fire_round_change(index);
        cluster.run_until_idle();
    }

    let block = cluster.assert_agreement(11);
    assert_eq!(block.hash(), fallback.hash());
    assert_vrank_view(&cluster, View::new(11, 1));
}

#[test]
fn test_future_prepare_waits_in_backlog() {
    let mut cluster = Cluster::new(4);
    let view = View::new(11, 2);
    let proposer = cluster.proposer_index(2);
    assert_eq!(proposer, D);
    let proposal = cluster.build_block(D, b"P");

    cluster.inject(A, cluster.vote(C, MessageCode::Prepare, view, &proposal));
    cluster.pump(A);
    assert_eq!(cluster.nodes[A].core.backlog_len(), 1);
    assert_eq!(cluster.nodes[A].core.stats().messages_backlogged, 1);

    // Entering (11, 2) is not enough: a Prepare needs the Preprepare first
    for from in [B, C, D] {
        cluster.inject(A, cluster.round_change(from, view));
    }
    cluster.pump(A);
    assert_eq!(cluster.nodes[A].core.current_view(), view);
    assert_eq!(cluster.nodes[A].core.backlog_len(), 1);

    cluster.inject(A, cluster.preprepare(D, view, &proposal));
    cluster.pump(A);

    let node = &cluster.nodes[A];
    assert_eq!(node.core.backlog_len(), 0);
    assert_eq!(node.core.state(), State::Preprepared);
    let prepares = node.core.round_state().unwrap().prepares();
    assert_eq!(prepares.size(), 2);
    assert!(prepares.has(&cluster.nodes[C].address));
    assert!(prepares.has(&node.address));
}

#[test]
fn test_ledger_commit_failure_unlocks() {
    let mut cluster = Cluster::new(4);
    cluster.nodes[A].backend.fail_next_commits(1);

    cluster.request(B, b"P");
    cluster.run_until_idle();

    let node = &cluster.nodes[A];
    assert_eq!(node.backend.height(), 10);
    assert_eq!(node.core.locked_hash(), None);
    assert_eq!(node.core.current_view(), View::new(11, 1));
    assert!(node.core.is_waiting_for_round_change());
    assert_eq!(node.core.stats().commit_failures, 1);
    for node in &cluster.nodes[B..] {
        assert_eq!(node.backend.height(), 11);
    }
}

#[test]
fn test_agreement_under_reordered_delivery() {
    for seed in 0..8 {
        let mut cluster = Cluster::new(4);
        let proposal = cluster.request(B, b"P");
        cluster.run_shuffled(seed);

        let block = cluster.assert_agreement(11);
        assert_eq!(block.hash(), proposal.hash(), "seed {seed}");
        assert!(cluster.seal_signers(&block).len() >= 3, "seed {seed}");
    }
}

#[test]
fn test_agreement_with_a_mute_validator() {
    for seed in 0..4 {
        let mut cluster = Cluster::new(4);
        let d = cluster.nodes[D].address;
        cluster.network.set_filter(move |origin, _, _| *origin != d);
        let proposal = cluster.request(B, b"P");
        cluster.run_shuffled(seed);

        let block = cluster.assert_agreement(11);
        assert_eq!(block.hash(), proposal.hash(), "seed {seed}");
        let signers = cluster.seal_signers(&cluster.nodes[A].backend.block(11).unwrap());
        assert!(!signers.contains(&d), "seed {seed}");
    }
}
