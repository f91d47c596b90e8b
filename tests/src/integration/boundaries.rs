//! Thresholds, rejections and timers at the edges of the protocol

use super::cluster::{Cluster, REQUEST_TIMEOUT};
use ibft_consensus::{Block, MessageCode, Proposal, State, View};
use std::time::Duration;

const A: usize = 0;
const B: usize = 1;
const C: usize = 2;
const D: usize = 3;

#[test]
fn test_single_validator_commits_at_round_zero() {
    let mut cluster = Cluster::new(1);
    assert_eq!(cluster.proposer_index(0), A);

    let proposal = cluster.request(A, b"solo");
    cluster.run_until_idle();

    let block = cluster.assert_agreement(11);
    assert_eq!(block.hash(), proposal.hash());
    assert_eq!(cluster.seal_signers(&block), vec![cluster.nodes[A].address]);

    let core = &cluster.nodes[A].core;
    assert_eq!(core.current_view(), View::new(12, 0));
    assert_eq!(core.stats().rounds_changed, 0);
}

#[test]
fn test_prepared_and_commit_need_three_of_four() {
    let mut cluster = Cluster::new(4);
    let (c, d) = (cluster.nodes[C].address, cluster.nodes[D].address);
    // C and D stay silent in the voting phases
    cluster.network.set_filter(move |origin, _, code| {
        !(matches!(code, MessageCode::Prepare | MessageCode::Commit) && (*origin == c || *origin == d))
    });
    let proposal = cluster.request(B, b"P");
    cluster.run_until_idle();

    let view = View::new(11, 0);
    assert_eq!(cluster.nodes[A].core.state(), State::Preprepared);
    assert_eq!(cluster.nodes[B].core.state(), State::Preprepared);

    // A third Prepare moves A to Prepared
    cluster.inject(A, cluster.vote(D, MessageCode::Prepare, view, &proposal));
    cluster.pump(A);
    assert_eq!(cluster.nodes[A].core.state(), State::Prepared);
    assert_eq!(cluster.nodes[A].core.locked_hash(), Some(proposal.hash()));

    // Own Commit plus C's is still short of a quorum
    cluster.inject(A, cluster.vote(C, MessageCode::Commit, view, &proposal));
    cluster.pump(A);
    assert_eq!(cluster.nodes[A].backend.height(), 10);

    cluster.inject(A, cluster.vote(D, MessageCode::Commit, view, &proposal));
    cluster.pump(A);
    assert_eq!(cluster.nodes[A].backend.height(), 11);
    let block = cluster.nodes[A].backend.block(11).unwrap();
    assert_eq!(cluster.seal_signers(&block).len(), 3);
}

#[test]
fn test_preprepare_with_wrong_parent_is_rejected() {
    let mut cluster = Cluster::new(4);
    let grandparent = cluster.nodes[A].backend.block(9).unwrap();
    let fork = Block::child_of(&grandparent, cluster.nodes[A].address, 999, b"fork".to_vec())
        .sealed_by(&cluster.nodes[A].key)
        .unwrap();
    let orphan = Block::child_of(&fork, cluster.nodes[B].address, 1_000, b"P".to_vec())
        .sealed_by(&cluster.nodes[B].key)
        .unwrap();
    assert_eq!(orphan.number(), 11);

    cluster.inject(A, cluster.preprepare(B, View::new(11, 0), &orphan));
    cluster.pump(A);

    let core = &cluster.nodes[A].core;
    assert_eq!(core.backlog_len(), 0);
    assert_eq!(core.stats().messages_dropped, 1);
    assert_eq!(core.current_view(), View::new(11, 1));
    assert!(core.is_waiting_for_round_change());
    assert_eq!(cluster.nodes[A].backend.height(), 10);
}

#[test]
fn test_preprepare_from_non_proposer_is_rejected() {
    let mut cluster = Cluster::new(4);
    let proposal = cluster.build_block(C, b"P");

    cluster.inject(A, cluster.preprepare(C, View::new(11, 0), &proposal));
    cluster.pump(A);

    let core = &cluster.nodes[A].core;
    assert_eq!(core.state(), State::AcceptRequest);
    assert_eq!(core.current_view(), View::new(11, 0));
    assert!(!core.is_waiting_for_round_change());
    assert_eq!(core.stats().messages_dropped, 1);
}

#[test]
fn test_duplicate_prepare_is_idempotent() {
    let mut cluster = Cluster::new(4);
    let view = View::new(11, 0);
    let proposal = cluster.build_block(B, b"P");
    cluster.inject(A, cluster.preprepare(B, view, &proposal));
    let prepare = cluster.vote(C, MessageCode::Prepare, view, &proposal);
    cluster.inject(A, prepare.clone());
    cluster.pump(A);

    let before = cluster.nodes[A].core.round_state().unwrap().prepares().size();
    cluster.inject(A, prepare);
    cluster.pump(A);

    let core = &cluster.nodes[A].core;
    assert_eq!(before, 2);
    assert_eq!(core.round_state().unwrap().prepares().size(), before);
    assert_eq!(core.state(), State::Preprepared);
    assert_eq!(core.current_view(), view);
    assert_eq!(core.stats().messages_dropped, 1);
}

#[test]
fn test_round_starts_only_at_quorum_of_votes() {
    let mut cluster = Cluster::new(4);
    let view = View::new(11, 1);

    for from in [B, C] {
        cluster.inject(A, cluster.round_change(from, view));
    }
    cluster.pump(A);
    assert_eq!(cluster.nodes[A].core.current_view(), View::new(11, 0));
    assert_eq!(cluster.nodes[A].core.round_change_votes(1), 2);

    cluster.inject(A, cluster.round_change(D, view));
    cluster.pump(A);
    let core = &cluster.nodes[A].core;
    assert_eq!(core.current_view(), view);
    assert_eq!(core.proposer(), Some(cluster.nodes[C].address));
}

#[test]
fn test_waiting_node_catches_up_on_weak_quorum() {
    let mut cluster = Cluster::new(4);
    cluster.fire_round_change(A);
    assert!(cluster.nodes[A].core.is_waiting_for_round_change());

    let target = View::new(11, 3);
    for from in [B, C] {
        cluster.inject(A, cluster.round_change(from, target));
    }
    cluster.pump(A);

    // F+1 votes pull A to round 3, its own vote completes the quorum
    let core = &cluster.nodes[A].core;
    assert_eq!(core.current_view(), target);
    assert!(!core.is_waiting_for_round_change());
    assert_eq!(core.proposer(), Some(cluster.nodes[A].address));
}

#[test]
fn test_round_change_timeouts_never_shrink() {
    let mut cluster = Cluster::new(4);
    for round in 1..=5 {
        assert_eq!(cluster.fire_round_change(A), Some(View::new(11, round)));
    }

    let history = cluster.nodes[A].timers.history();
    assert_eq!(history.len(), 6);
    assert_eq!(history[0], (View::new(11, 1), REQUEST_TIMEOUT + Duration::from_secs(1)));
    assert_eq!(history[1], (View::new(11, 2), REQUEST_TIMEOUT + Duration::from_secs(2)));
    for pair in history.windows(2) {
        assert!(pair[1].1 >= pair[0].1);
        assert_eq!(pair[1].0.round, pair[0].0.round + 1);
    }
}

#[test]
fn test_only_the_committee_votes() {
    let mut cluster = Cluster::with_committee(10, 4);
    let view = View::new(11, 0);
    let committee = cluster.committee(view);
    assert_eq!(committee.len(), 4);
    assert_eq!(cluster.nodes[A].core.validators().f(), 1);

    let proposer = cluster.proposer_index(0);
    assert_eq!(committee[0], proposer);
    let member = committee[1];
    let outsider = (0..cluster.size())
        .find(|index| !committee.contains(index))
        .unwrap();

    let proposal = cluster.request(proposer, b"P");
    cluster.pump(member);
    let before = cluster.nodes[member].core.round_state().unwrap().prepares().size();
    assert_eq!(before, 2);

    // A Prepare from a validator outside the committee does not count
    cluster.inject(member, cluster.vote(outsider, MessageCode::Prepare, view, &proposal));
    cluster.pump(member);
    let node = &cluster.nodes[member];
    assert_eq!(node.core.round_state().unwrap().prepares().size(), before);
    assert!(!node.core.round_state().unwrap().prepares().has(&cluster.nodes[outsider].address));
    assert_eq!(node.core.state(), State::Preprepared);

    cluster.run_until_idle();
    let block = cluster.assert_agreement(11);
    assert_eq!(block.hash(), proposal.hash());
    assert_eq!(cluster.heights(), vec![11; 10]);

    let signers = cluster.seal_signers(&block);
    assert!(signers.len() >= 3);
    for signer in &signers {
        let index = cluster.nodes.iter().position(|node| node.address == *signer).unwrap();
        assert!(committee.contains(&index), "seal from non-member {index}");
    }
}
