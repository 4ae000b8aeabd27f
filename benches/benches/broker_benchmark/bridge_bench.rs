use std::{hint::black_box, sync::Arc};

use chanbus::{Broker, CancelToken, FieldType, LuaBridge, Payload, PayloadType};
use criterion::{criterion_group, criterion_main, Criterion};
use mlua::Lua;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sample {
    id: i64,
    name: String,
    values: Vec<f64>,
}

impl Payload for Sample {
    fn payload_type() -> PayloadType {
        PayloadType::record("Sample")
            .field("id", FieldType::Int)
            .field("name", FieldType::Str)
            .field("values", FieldType::List(Box::new(FieldType::Float)))
            .constructor(&["id", "name"])
    }
}

fn setup() -> (Lua, Arc<Broker>) {
    let broker = Arc::new(Broker::default());
    broker.register::<Sample>().unwrap();
    let lua = Lua::new();
    LuaBridge::new(broker.clone(), CancelToken::new())
        .install(&lua)
        .unwrap();
    (lua, broker)
}

fn bench_lua_to_rust(c: &mut Criterion) {
    let (lua, broker) = setup();
    let sub = broker.subscriber::<Sample>("samples").unwrap();
    let push = lua
        .load(
            r#"
            local S = chanbus.message("Sample")
            local pub = S.publisher("samples")
            return function()
                local s = S.new(1, "bench")
                s.values = { 1.0, 2.0, 3.0 }
                pub:push(s)
            end
            "#,
        )
        .eval::<mlua::Function>()
        .unwrap();

    c.bench_function("lua_push_rust_pop", |b| {
        b.iter(|| {
            push.call::<()>(()).unwrap();
            black_box(sub.try_pop().unwrap());
        })
    });
}

fn bench_rust_to_lua(c: &mut Criterion) {
    let (lua, broker) = setup();
    let publisher = broker.publisher::<Sample>("samples-out").unwrap();
    let pop = lua
        .load(
            r#"
            local sub = chanbus.message("Sample").subscriber("samples-out")
            return function()
                local s = sub:try_pop()
                return s.id + #s.values
            end
            "#,
        )
        .eval::<mlua::Function>()
        .unwrap();
    let sample = Sample {
        id: 7,
        name: "bench".to_string(),
        values: vec![0.5; 8],
    };

    c.bench_function("rust_push_lua_pop", |b| {
        b.iter(|| {
            publisher.push(sample.clone());
            black_box(pop.call::<i64>(()).unwrap());
        })
    });
}

criterion_group!(benches, bench_lua_to_rust, bench_rust_to_lua);
criterion_main!(benches);
