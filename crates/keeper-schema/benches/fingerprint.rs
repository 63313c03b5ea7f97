use criterion::{criterion_group, criterion_main, Criterion};
use keeper_schema::{fingerprint, parse_spec_str, ContainerSpec, SpecFormat};
use std::hint::black_box;

fn minimal_spec() -> ContainerSpec {
    ContainerSpec::new("web", "nginx:1.25")
}

fn large_spec() -> ContainerSpec {
    let mut spec = ContainerSpec::new("worker", "registry.example.com/team/worker:2024.10");
    spec.command = vec!["/usr/bin/worker".to_owned()];
    spec.args = (0..32).map(|i| format!("--flag-{i}=value-{i}")).collect();
    for i in (0..64).rev() {
        spec = spec.with_env(format!("VAR_{i:03}"), format!("value-{i}"));
    }
    spec
}

fn bench_fingerprint_minimal(c: &mut Criterion) {
    let spec = minimal_spec();
    c.bench_function("fingerprint_minimal", |b| {
        b.iter(|| fingerprint(black_box(&spec)));
    });
}

fn bench_fingerprint_64_env(c: &mut Criterion) {
    let spec = large_spec();
    c.bench_function("fingerprint_32_args_64_env", |b| {
        b.iter(|| fingerprint(black_box(&spec)));
    });
}

fn bench_parse_and_fingerprint_yaml(c: &mut Criterion) {
    let input = r"
name: web
image: nginx:1.25
command: [nginx]
args: ['-g', 'daemon off;']
env:
  - {name: MODE, value: prod}
  - {name: WORKERS, value: '4'}
volumeMounts:
  - {source: /srv/www, target: /usr/share/nginx/html, readOnly: true}
";
    c.bench_function("parse_yaml_then_fingerprint", |b| {
        b.iter(|| {
            let spec = parse_spec_str(black_box(input), SpecFormat::Yaml).unwrap();
            fingerprint(&spec)
        });
    });
}

criterion_group!(
    benches,
    bench_fingerprint_minimal,
    bench_fingerprint_64_env,
    bench_parse_and_fingerprint_yaml
);
criterion_main!(benches);
