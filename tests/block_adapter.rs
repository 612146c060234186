mod common;

use common::{SimDelay, SimFlash};
use microchip_sst26_nor_flash_rs::block::{
    BlockAdapter, BlockEngine, BlockGeometry, DirectMappedEngine, EngineError, NorBlockDriver,
    LOGICAL_SECTOR_SIZE,
};
use microchip_sst26_nor_flash_rs::{DriverConfig, Sst26Flash, WriteVerification};

type Adapter = BlockAdapter<Sst26Flash<SimFlash, SimDelay>>;

fn adapter(sim: &SimFlash) -> Adapter {
    BlockAdapter::new(Sst26Flash::new(
        sim.clone(),
        SimDelay::default(),
        DriverConfig::new(WriteVerification::ReadBack),
    ))
}

#[test]
fn geometry_follows_the_chip() {
    let sim = SimFlash::new();
    let adapter = adapter(&sim);
    assert_eq!(
        *adapter.geometry(),
        BlockGeometry {
            total_blocks: 512,
            words_per_block: 1024
        }
    );
    let limited = adapter.with_total_blocks(16);
    assert_eq!(limited.geometry().total_blocks, 16);
}

#[test]
fn words_are_little_endian_at_word_addresses() {
    let sim = SimFlash::new();
    let mut adapter = adapter(&sim);

    adapter.write(0x400, &[0x0403_0201, 0x0807_0605]).unwrap();

    assert_eq!(sim.memory(0x1000, 8), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    let mut words = [0u32; 2];
    adapter.read(0x400, &mut words).unwrap();
    assert_eq!(words, [0x0403_0201, 0x0807_0605]);
}

#[test]
fn long_transfers_are_chunked() {
    let sim = SimFlash::new();
    let mut adapter = adapter(&sim);
    let words: Vec<u32> = (0..1024).map(|i| i * 3 + 1).collect();

    adapter.write(1024, &words).unwrap();

    let mut back = vec![0u32; 1024];
    adapter.read(1024, &mut back).unwrap();
    assert_eq!(back, words);
    assert!(sim
        .state()
        .programs
        .iter()
        .all(|(addr, len)| (addr % 256) as usize + len <= 256));
}

#[test]
fn blocks_map_onto_sectors() {
    let sim = SimFlash::new();
    let mut adapter = adapter(&sim);
    adapter.write(3 * 1024, &[0]).unwrap();
    assert_eq!(adapter.erase_verify(3), Err(EngineError::Error));

    adapter.erase_block(3, 42).unwrap();

    assert_eq!(sim.state().erases, vec![3 * 4096]);
    adapter.erase_verify(3).unwrap();
}

#[test]
fn out_of_range_block_is_rejected() {
    let sim = SimFlash::new();
    let mut adapter = adapter(&sim).with_total_blocks(8);
    assert_eq!(adapter.erase_block(8, 0), Err(EngineError::SystemInvalidBlock));
    assert_eq!(adapter.erase_verify(100), Err(EngineError::SystemInvalidBlock));
    assert_eq!(sim.state().transactions, 0);
}

#[test]
fn word_access_stays_inside_the_configured_blocks() {
    let sim = SimFlash::new();
    let mut adapter = adapter(&sim).with_total_blocks(4);

    assert_eq!(
        adapter.write(4 * 1024, &[0]),
        Err(EngineError::SystemInvalidBlock)
    );
    assert_eq!(
        adapter.write(4 * 1024 - 1, &[0, 0]),
        Err(EngineError::SystemInvalidBlock)
    );
    let mut words = [0u32; 1];
    assert_eq!(
        adapter.read(0x4000_0000, &mut words),
        Err(EngineError::SystemInvalidBlock)
    );
    assert_eq!(
        adapter.read(u32::MAX, &mut words),
        Err(EngineError::SystemInvalidBlock)
    );
    assert_eq!(sim.state().transactions, 0);
    assert_eq!(sim.memory(0x4000, 4), vec![0xFF; 4]);

    adapter.write(4 * 1024 - 1, &[0]).unwrap();
    assert_eq!(sim.memory(0x3FFC, 4), vec![0; 4]);
}

#[test]
fn read_back_mismatch_maps_to_invalid_write() {
    let sim = SimFlash::new();
    sim.state().stuck_address = Some(0x2002);
    let mut adapter = adapter(&sim);
    assert_eq!(
        adapter.write(0x800, &[0]),
        Err(EngineError::InvalidWrite)
    );
}

#[test]
fn system_error_reinitializes_the_chip() {
    let sim = SimFlash::new();
    sim.state().protected = true;
    let mut adapter = adapter(&sim);

    adapter.system_error(EngineError::SystemInvalidSectorMap).unwrap();

    let state = sim.state();
    assert_eq!(state.resets, 1);
    assert!(!state.protected);
}

#[test]
fn engine_runs_on_the_adapter() {
    let sim = SimFlash::new();
    sim.state().protected = true;
    let mut engine: DirectMappedEngine<Adapter> =
        DirectMappedEngine::new(adapter(&sim).with_total_blocks(4));
    engine.initialize().unwrap();
    engine.open().unwrap();
    assert_eq!(sim.state().resets, 1);
    assert_eq!(engine.total_sectors(), 32);

    let mut sector = [0u8; LOGICAL_SECTOR_SIZE];
    sector[..5].copy_from_slice(b"hello");
    engine.sector_write(10, &sector).unwrap();
    assert_eq!(sim.memory(4096 + 2 * 512, 5), b"hello".to_vec());

    sector[..5].copy_from_slice(b"world");
    engine.sector_write(10, &sector).unwrap();
    assert_eq!(sim.state().erases, vec![4096]);

    let mut back = [0u8; LOGICAL_SECTOR_SIZE];
    engine.sector_read(10, &mut back).unwrap();
    assert_eq!(&back[..5], b"world");
}
