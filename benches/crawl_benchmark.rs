/// Benchmarks for crawling and record mapping
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use svn_harvest::crawler::crawl_repository;
use svn_harvest::repository::MemoryRepository;
use svn_harvest::sink::revision_actions;
use svn_harvest::types::{CrawlParameters, RepositoryAddress};
use tokio_util::sync::CancellationToken;

/// A history of `revisions` commits, each touching a handful of files
fn history(revisions: usize) -> MemoryRepository {
    let mut repo = MemoryRepository::new(RepositoryAddress::parse("mem:///bench").unwrap());
    for i in 0..revisions {
        let mut commit = repo.commit("bench", &format!("commit {}", i));
        for j in 0..5 {
            let path = format!("/trunk/src/module_{}/file_{}.rs", i % 10, j);
            let body = format!("pub fn f_{}_{}() -> usize {{ {} }}\n", i, j, i * j);
            commit = if i < 10 {
                commit.add_file(&path, body)
            } else {
                commit.modify_file(&path, body)
            };
        }
        if i % 7 == 0 {
            let asset = format!("/trunk/assets/img_{}.png", i);
            commit = commit.add_file_with_mime(&asset, [0u8; 256], "image/png");
        }
        commit.commit();
    }
    repo
}

fn benchmark_crawl(c: &mut Criterion) {
    let mut group = c.benchmark_group("crawl");

    for revisions in [100, 500, 1000].iter() {
        let repo = history(*revisions);
        let params = CrawlParameters::new("/trunk")
            .with_exclude_patterns(&[r".*\.tmp"])
            .unwrap()
            .with_max_file_size(Some(1_048_576));
        let cancel = CancellationToken::new();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_revisions", revisions)),
            revisions,
            |b, _| {
                b.iter(|| crawl_repository(black_box(&repo), &params, &cancel).unwrap());
            },
        );
    }

    group.finish();
}

fn benchmark_actions(c: &mut Criterion) {
    let repo = history(500);
    let outcome =
        crawl_repository(&repo, &CrawlParameters::new("/"), &CancellationToken::new()).unwrap();

    c.bench_function("revision_actions_500", |b| {
        b.iter(|| {
            outcome
                .revisions
                .iter()
                .map(|r| revision_actions(black_box(r)).unwrap().len())
                .sum::<usize>()
        });
    });
}

criterion_group!(benches, benchmark_crawl, benchmark_actions);
criterion_main!(benches);
