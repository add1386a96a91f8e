use criterion::{black_box, criterion_group, criterion_main, Criterion};
use opl_engine::{AudioBlock, OplSynth, Synth};
use opl_ir::PcmFormat;

fn keyed_synth() -> OplSynth {
    let mut synth = OplSynth::new(PcmFormat::stereo16(49716)).unwrap();
    synth.write_register(0x01, 0x20);
    for ch in 0..9u16 {
        let slot = (ch / 3) * 8 + ch % 3;
        synth.write_register(0x20 + slot, 0x21);
        synth.write_register(0x23 + slot, 0x21);
        synth.write_register(0x43 + slot, 0x00);
        synth.write_register(0x60 + slot, 0xF4);
        synth.write_register(0x63 + slot, 0xF4);
        synth.write_register(0xA0 + ch, 0x41 + ch as u8 * 8);
        synth.write_register(0xC0 + ch, 0x0E);
        synth.write_register(0xB0 + ch, 0x31);
    }
    synth
}

fn bench_render(c: &mut Criterion) {
    let mut synth = keyed_synth();
    let mut block = AudioBlock::new(512, 2);
    c.bench_function("render 512 frames, 9 voices", |b| {
        b.iter(|| {
            synth.render(&mut block);
            black_box(block.samples());
        })
    });
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
