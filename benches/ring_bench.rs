use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::{sync::Arc, thread};

use baton::concurrent::{
    broadcast, command_ring, AlignedBuffer, BroadcastReceiver, BroadcastTransmitter, CommandRing,
    CopyBroadcastReceiver,
};

fn benchmark_command_ring_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("CommandRing_SingleThreaded");
    let batch = 1000u64;

    for payload_length in [16usize, 64, 256].iter() {
        group.throughput(Throughput::Elements(batch));
        group.bench_with_input(
            BenchmarkId::new("write_read", payload_length),
            payload_length,
            |b, &payload_length| {
                let mem =
                    AlignedBuffer::new(1024 * 1024 + command_ring::TRAILER_LENGTH).unwrap();
                let ring = CommandRing::new(mem.buffer()).unwrap();
                let payload = vec![0u8; payload_length];

                b.iter(|| {
                    for _ in 0..batch {
                        ring.write(1, &payload).unwrap();
                    }
                    let mut drained = 0u64;
                    while drained < batch {
                        drained += ring.read(|_, _| {}, usize::MAX) as u64;
                    }
                });
            },
        );
    }

    group.finish();
}

fn benchmark_broadcast_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("Broadcast_SingleThreaded");
    let batch = 1000u64;
    group.throughput(Throughput::Elements(batch));

    group.bench_function("transmit_receive_64b", |b| {
        let mem = AlignedBuffer::new(1024 * 1024 + broadcast::TRAILER_LENGTH).unwrap();
        let transmitter = BroadcastTransmitter::new(mem.buffer()).unwrap();
        let mut receiver =
            CopyBroadcastReceiver::new(BroadcastReceiver::new(mem.buffer()).unwrap());
        let payload = [0u8; 64];

        b.iter(|| {
            for _ in 0..batch {
                transmitter.transmit(1, &payload).unwrap();
            }
            let mut received = 0u64;
            while received < batch {
                received += receiver.receive(|_, _| {}).unwrap() as u64;
            }
        });
    });

    group.finish();
}

fn benchmark_command_ring_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("CommandRing_Contention");

    for producers in [1usize, 2, 4].iter() {
        group.bench_with_input(
            BenchmarkId::new("producers", producers),
            producers,
            |b, &producers| {
                let per_producer = 2000usize;

                b.iter(|| {
                    let mem = Arc::new(
                        AlignedBuffer::new(256 * 1024 + command_ring::TRAILER_LENGTH).unwrap(),
                    );
                    let consumer_ring = CommandRing::new(mem.buffer()).unwrap();

                    let mut handles = Vec::new();
                    for _ in 0..producers {
                        let mem = Arc::clone(&mem);
                        handles.push(thread::spawn(move || {
                            let ring = CommandRing::new(mem.buffer()).unwrap();
                            let payload = [0u8; 32];
                            let mut sent = 0;
                            while sent < per_producer {
                                if ring.write(1, &payload).is_ok() {
                                    sent += 1;
                                } else {
                                    thread::yield_now();
                                }
                            }
                        }));
                    }

                    let mut received = 0usize;
                    while received < producers * per_producer {
                        let drained = consumer_ring.read(|_, _| {}, usize::MAX);
                        if drained == 0 {
                            thread::yield_now();
                        }
                        received += drained;
                    }

                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_command_ring_throughput,
    benchmark_broadcast_throughput,
    benchmark_command_ring_contention
);
criterion_main!(benches);
