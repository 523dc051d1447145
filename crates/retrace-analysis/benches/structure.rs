//! Benchmarks for control-flow structuring.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use retrace_analysis::{AnalysisConfig, StructureAnalysis};
use retrace_core::{BasicBlock, BasicBlockId, ControlFlowGraph, Frame, Procedure, ProcedureId};

/// A chain of `count` diamonds, each wrapped in a loop back to its head.
fn create_looped_diamonds(count: usize) -> Procedure {
    // entry, then 4 blocks per diamond, then exit.
    let total = count * 4 + 2;
    let exit = BasicBlockId(total as u32 - 1);
    let mut cfg = ControlFlowGraph::new(BasicBlockId(0), exit);
    for i in 0..total {
        cfg.add_block(BasicBlock::new(BasicBlockId(i as u32), format!("b{i}")));
    }
    let mut prev = BasicBlockId(0);
    for d in 0..count {
        let base = 1 + d as u32 * 4;
        let (head, then, els, join) = (
            BasicBlockId(base),
            BasicBlockId(base + 1),
            BasicBlockId(base + 2),
            BasicBlockId(base + 3),
        );
        cfg.add_edge(prev, head);
        cfg.add_edge(head, then);
        cfg.add_edge(head, els);
        cfg.add_edge(then, join);
        cfg.add_edge(els, join);
        cfg.add_edge(join, head);
        prev = join;
    }
    cfg.add_edge(prev, exit);
    Procedure::new(ProcedureId(0), "bench", Frame::new(4), cfg)
}

/// A straight chain of `count` blocks.
fn create_linear(count: usize) -> Procedure {
    let count = count.max(2);
    let mut cfg = ControlFlowGraph::new(BasicBlockId(0), BasicBlockId(count as u32 - 1));
    for i in 0..count {
        cfg.add_block(BasicBlock::new(BasicBlockId(i as u32), format!("b{i}")));
    }
    for i in 1..count {
        cfg.add_edge(BasicBlockId(i as u32 - 1), BasicBlockId(i as u32));
    }
    Procedure::new(ProcedureId(0), "bench", Frame::new(4), cfg)
}

fn bench_structuring(c: &mut Criterion) {
    let mut group = c.benchmark_group("structure");
    let config = AnalysisConfig::sequential();

    for size in [10, 100, 1000] {
        let linear = create_linear(size);
        group.bench_with_input(BenchmarkId::new("linear", size), &linear, |b, p| {
            b.iter(|| StructureAnalysis::analyze(black_box(p), &config))
        });

        let looped = create_looped_diamonds(size / 4);
        group.bench_with_input(BenchmarkId::new("looped_diamonds", size), &looped, |b, p| {
            b.iter(|| StructureAnalysis::analyze(black_box(p), &config))
        });
    }

    group.finish();
}

fn bench_dump(c: &mut Criterion) {
    let proc = create_looped_diamonds(64);
    let structure = StructureAnalysis::analyze(&proc, &AnalysisConfig::sequential());
    if let Ok(structure) = structure {
        c.bench_function("structure_dump", |b| b.iter(|| black_box(&structure).dump()));
    }
}

criterion_group!(benches, bench_structuring, bench_dump);
criterion_main!(benches);
