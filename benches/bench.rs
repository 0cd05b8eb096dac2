//! Criterion benchmarks for searchsync.
//!
//! Covers document assembly from JSON payloads and batch application on the
//! tantivy engine with each writer policy.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::Rng;
use serde_json::{Value, json};

use searchsync::backend::IndexingBackend;
use searchsync::config::{BackendConfig, ExecutionMode, PartitionConfig};
use searchsync::document::ValueType;
use searchsync::engine::TantivyDirectory;
use searchsync::schema::{IndexSchema, ObjectStructure, SchemaRegistry, TemplateTarget};
use searchsync::work::operation::assemble;
use searchsync::work::{EntityRef, IndexOperation, JsonPayload};
use searchsync::writer::WriterPolicy;

fn schemas() -> Arc<SchemaRegistry> {
    let schema = IndexSchema::builder("product")
        .field("name", ValueType::Text)
        .field("price", ValueType::Float)
        .multi_valued_field("tags", ValueType::Keyword)
        .multi_valued_object("variants", ObjectStructure::Nested, |v| {
            v.field("sku", ValueType::Keyword)
                .field("stock", ValueType::Integer)
        })
        .object("attributes", ObjectStructure::Flattened, |a| {
            a.template("values", "*", TemplateTarget::Value(ValueType::Keyword), true)
        })
        .build()
        .expect("product schema");
    let mut registry = SchemaRegistry::new();
    registry.register(schema).expect("register product");
    Arc::new(registry)
}

/// Generate a product payload with a random number of variants.
fn generate_payload(rng: &mut impl Rng, id: usize) -> Value {
    let variants: Vec<Value> = (0..rng.random_range(1..5))
        .map(|v| json!({"sku": format!("sku-{id}-{v}"), "stock": rng.random_range(0..100)}))
        .collect();
    json!({
        "name": format!("product {id}"),
        "price": rng.random_range(1.0..500.0),
        "tags": ["new", "sale"],
        "variants": variants,
        "attributes": {"color": ["red", "blue"], "size": "xl"}
    })
}

fn generate_operations(count: usize) -> Vec<IndexOperation> {
    let mut rng = rand::rng();
    (0..count)
        .map(|i| {
            IndexOperation::add(
                EntityRef::new("product", i.to_string()),
                JsonPayload::new(generate_payload(&mut rng, i)),
            )
        })
        .collect()
}

fn bench_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("assembly");
    let schemas = schemas();
    let mut rng = rand::rng();
    let payloads: Vec<JsonPayload> = (0..100)
        .map(|i| JsonPayload::new(generate_payload(&mut rng, i)))
        .collect();
    let entity = EntityRef::new("product", "1");

    group.bench_function("assemble_single_entity", |b| {
        b.iter(|| black_box(assemble(&entity, &payloads[0], schemas.as_ref()).unwrap()))
    });

    group.throughput(Throughput::Elements(payloads.len() as u64));
    group.bench_function("assemble_batch", |b| {
        b.iter(|| {
            for payload in &payloads {
                black_box(assemble(&entity, payload, schemas.as_ref()).unwrap());
            }
        })
    });

    group.finish();
}

fn bench_apply_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_batch");
    group.sample_size(20);

    for policy in [
        WriterPolicy::Exclusive,
        WriterPolicy::Shared,
        WriterPolicy::NearRealTime,
    ] {
        let backend = IndexingBackend::new(BackendConfig::default(), schemas());
        backend
            .register_partition(
                PartitionConfig::new("products")
                    .with_writer_policy(policy)
                    .with_thread_pool_size(4),
                Arc::new(TantivyDirectory::create_in_ram("products").expect("ram index")),
            )
            .expect("register partition");

        for size in [10, 100] {
            let operations = generate_operations(size);
            group.throughput(Throughput::Elements(size as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("{policy:?}"), size),
                &operations,
                |b, operations| {
                    b.iter(|| {
                        backend
                            .apply_batch("products", operations.clone(), ExecutionMode::Sync)
                            .unwrap()
                    })
                },
            );
        }

        backend.shutdown_all().expect("shutdown");
    }

    group.finish();
}

criterion_group!(benches, bench_assembly, bench_apply_batch);
criterion_main!(benches);
