//! Benchmarks for request encoding and token stream decoding.

#![allow(clippy::unwrap_used, missing_docs)]

use bytes::{BufMut, BytesMut};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use tds_protocol::{
    ColMetaData, ColumnData, Collation, Done, Login7, PacketHeader, PacketStatus, PacketType,
    SqlBatch, TdsVersion, Token, TokenParser, TokenType, TypeId, TypeInfo,
    packet::PACKET_HEADER_SIZE,
};

fn bench_packet_header(c: &mut Criterion) {
    let header = PacketHeader::new(PacketType::SqlBatch, PacketStatus::END_OF_MESSAGE, 1000);
    let encoded = header.encode_to_bytes();

    c.bench_function("packet_header_decode", |b| {
        b.iter(|| {
            let mut cursor = encoded.clone();
            black_box(PacketHeader::decode(&mut cursor).unwrap())
        })
    });
    c.bench_function("packet_header_encode", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(PACKET_HEADER_SIZE);
            header.encode(&mut buf);
            black_box(buf)
        })
    });
}

fn bench_requests(c: &mut Criterion) {
    let login = Login7::new()
        .with_sql_auth("sa", "secret")
        .with_database("eCareDev")
        .with_app_name("bench");
    c.bench_function("login7_encode", |b| b.iter(|| black_box(login.encode())));

    let batch = SqlBatch::new("SELECT id, name FROM patients WHERE ward = 3");
    c.bench_function("sql_batch_encode", |b| {
        b.iter(|| black_box(batch.encode(TdsVersion::V7_4)))
    });
}

fn result_set(rows: usize) -> BytesMut {
    let collation = Collation {
        info: 0x0409,
        sort_id: 52,
    };
    let meta = ColMetaData {
        columns: vec![
            ColumnData::new("id", TypeInfo::new(TypeId::IntN).with_max_length(4)),
            ColumnData::new(
                "name",
                TypeInfo::new(TypeId::BigVarChar)
                    .with_max_length(50)
                    .with_collation(collation),
            ),
            ColumnData::new("score", TypeInfo::new(TypeId::FloatN).with_max_length(8)),
        ],
    };
    let mut buf = BytesMut::new();
    meta.encode(&mut buf, TdsVersion::V7_4);
    for i in 0..rows {
        buf.put_u8(TokenType::Row as u8);
        buf.put_u8(4);
        buf.put_i32_le(i as i32);
        buf.put_u16_le(12);
        buf.put_slice(b"patient-0000");
        buf.put_u8(8);
        buf.put_f64_le(i as f64 * 0.5);
    }
    Done::with_count(rows as u64).encode(&mut buf, TokenType::Done, TdsVersion::V7_4);
    buf
}

fn bench_token_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_stream");
    for rows in [10usize, 1000] {
        let data = result_set(rows).freeze();
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_function(format!("{rows}_rows"), |b| {
            b.iter(|| {
                let mut parser = TokenParser::new(data.clone(), TdsVersion::V7_4);
                let mut count = 0;
                while let Some(token) = parser.next_token().unwrap() {
                    if matches!(token, Token::Row(_)) {
                        count += 1;
                    }
                }
                black_box(count)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_packet_header, bench_requests, bench_token_stream);
criterion_main!(benches);
