use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use homekit_controller::net::{FrameDecryptor, FrameEncryptor};
use homekit_controller::protocol::crypto::{SrpGroup, SrpInteger, SrpParams};
use homekit_controller::protocol::http::HttpCodec;

fn srp_benchmark(c: &mut Criterion) {
    let group = SrpGroup::new(&SrpParams::RFC5054_3072).unwrap();
    let generator = SrpInteger::from(SrpParams::RFC5054_3072.generator);
    let secret = SrpInteger::random(32).unwrap();

    c.bench_function("srp_mod_pow_3072", |b| {
        b.iter(|| {
            generator
                .mod_pow(black_box(&secret), group.prime())
                .unwrap()
        })
    });
}

fn frame_benchmark(c: &mut Criterion) {
    let key = [0x42u8; 32];
    let payload = vec![0xA5u8; 4096];

    let mut group = c.benchmark_group("frames");
    group.throughput(Throughput::Bytes(payload.len() as u64));

    let mut encryptor = FrameEncryptor::new(&key).unwrap();
    group.bench_function("encrypt_4k", |b| {
        b.iter(|| encryptor.encrypt(black_box(&payload)).unwrap())
    });

    let frame = FrameEncryptor::new(&key)
        .unwrap()
        .encrypt(&payload[..1024])
        .unwrap();
    group.bench_function("decrypt_1k_frame", |b| {
        b.iter_batched(
            || FrameDecryptor::new(&key).unwrap(),
            |mut decryptor| decryptor.decrypt_block(black_box(&frame)).unwrap().0,
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn codec_benchmark(c: &mut Criterion) {
    let body = br#"{"characteristics":[{"aid":1,"iid":9,"value":21.5},{"aid":1,"iid":10,"value":true}]}"#;
    let mut message = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/hap+json\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    message.extend_from_slice(body);

    let mut chunked = b"EVENT/1.0 200 OK\r\nContent-Type: application/hap+json\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    for part in body.chunks(32) {
        chunked.extend_from_slice(format!("{:x}\r\n", part.len()).as_bytes());
        chunked.extend_from_slice(part);
        chunked.extend_from_slice(b"\r\n");
    }
    chunked.extend_from_slice(b"0\r\n\r\n");

    c.bench_function("http_decode_response", |b| {
        let mut codec = HttpCodec::new();
        b.iter(|| {
            codec.feed(black_box(&message)).unwrap();
            codec.decode().unwrap().unwrap()
        })
    });

    c.bench_function("http_decode_chunked_event", |b| {
        let mut codec = HttpCodec::new();
        b.iter(|| {
            codec.feed(black_box(&chunked)).unwrap();
            codec.decode().unwrap().unwrap()
        })
    });
}

criterion_group!(benches, srp_benchmark, frame_benchmark, codec_benchmark);
criterion_main!(benches);
