//! # Istanbul BFT Benchmarks
//!
//! | Path | What is measured |
//! |------|------------------|
//! | Codec | Commit encode, decode and sender recovery |
//! | Validator set | Proposer rotation and committee selection |
//! | Cluster | One height finalized by N in-process validators |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ibft_consensus::domain::{prepare_committed_seal, signing_payload, Subject};
use ibft_consensus::{ConsensusMessage, MessageCode, MessageCodec, ProposerPolicy, ValidatorSet, View};
use ibft_tests::integration::cluster::Cluster;
use shared_crypto::{recover_address, Address, Secp256k1KeyPair};
use std::time::Duration;

fn create_commit(key: &Secp256k1KeyPair, codec: &MessageCodec) -> Vec<u8> {
    let subject = Subject {
        view: View::new(11, 0),
        digest: [7u8; 32],
        prev_hash: [9u8; 32],
    };
    let body = codec.encode_subject(&subject).unwrap();
    let message = ConsensusMessage {
        code: MessageCode::Commit,
        prev_hash: subject.prev_hash,
        signature: key
            .sign_recoverable(&signing_payload(MessageCode::Commit, &subject.prev_hash, &body))
            .unwrap(),
        committed_seal: Some(
            key.sign_recoverable(&prepare_committed_seal(&subject.digest))
                .unwrap(),
        ),
        body,
        sender: key.address(),
    };
    codec.encode(&message).unwrap()
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let codec = MessageCodec::default();
    let key = Secp256k1KeyPair::from_seed(1).unwrap();
    let payload = create_commit(&key, &codec);

    group.bench_function("decode_commit", |b| {
        b.iter(|| black_box(codec.decode(black_box(&payload)).unwrap()))
    });

    let message = codec.decode(&payload).unwrap();
    group.bench_function("recover_sender", |b| {
        b.iter(|| {
            black_box(message.verify_sender(|data, sig| recover_address(data, sig).ok()))
        })
    });
    group.finish();
}

fn bench_validator_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("validator_set");
    for size in [4usize, 21, 100] {
        let addresses: Vec<Address> = (0..size)
            .map(|i| {
                let mut address = [0u8; 20];
                address[..8].copy_from_slice(&(i as u64).to_be_bytes());
                address
            })
            .collect();
        let mut set = ValidatorSet::new(addresses.clone(), ProposerPolicy::RoundRobin, 21);
        let view = View::new(11, 2);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("calc_proposer", size), &size, |b, _| {
            b.iter(|| set.calc_proposer(Some(addresses[0]), black_box(3)))
        });
        group.bench_with_input(BenchmarkId::new("sub_list", size), &size, |b, _| {
            b.iter(|| black_box(set.sub_list(&[5u8; 32], &view)))
        });
    }
    group.finish();
}

fn bench_cluster_height(c: &mut Criterion) {
    let mut group = c.benchmark_group("cluster");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);

    for size in [1usize, 4, 7] {
        group.bench_with_input(BenchmarkId::new("finalize_one_height", size), &size, |b, &size| {
            b.iter(|| {
                let mut cluster = Cluster::new(size);
                let proposer = cluster.proposer_index(0);
                cluster.request(proposer, b"bench");
                cluster.run_until_idle();
                black_box(cluster.heights())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_codec, bench_validator_set, bench_cluster_height);
criterion_main!(benches);
