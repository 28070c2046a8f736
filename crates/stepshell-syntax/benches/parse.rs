use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use stepshell_syntax::{parse_string, DecoratorRegistry, ParserConfig};

const SIMPLE_SRC: &str = r#"
var greeting = "hello"
fun greet(name String = "World") {
    echo "@var.greeting, @var.name!"
}
"#;

const PIPELINE_SRC: &str = r#"
fun deploy(env String) {
    for region in 1...5 {
        when @var.ENV {
            "prod" | "production" -> @aws.secret.api_key | @ssh(host=region) { echo "shipping" > out.log }
            r"^staging-" -> echo "staging"
            else -> echo "unknown"
        }
    }
    try {
        @timeout(30s) { echo "working" }
    } catch {
        echo "failed"
    } finally {
        echo "done"
    }
}
"#;

fn bench(c: &mut Criterion) {
    let registry = DecoratorRegistry::new();
    let config = ParserConfig::new();

    let mut g = c.benchmark_group("simple");
    g.throughput(Throughput::Bytes(SIMPLE_SRC.len() as u64));
    g.bench_function("parse simple", |b| b.iter(|| parse_string(black_box(SIMPLE_SRC), &registry, &config)));
    g.finish();

    let mut g = c.benchmark_group("pipeline");
    g.throughput(Throughput::Bytes(PIPELINE_SRC.len() as u64));
    g.bench_function("parse pipeline", |b| b.iter(|| parse_string(black_box(PIPELINE_SRC), &registry, &config)));
    g.finish();
}

criterion_group!(benches, bench);
criterion_main!(benches);
