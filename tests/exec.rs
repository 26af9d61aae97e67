//! End-to-end scenarios: hand-assembled AArch64 words are placed in host memory (guest
//! addresses are identity-mapped, so a `Vec<u32>` is a guest code page), the dispatcher is
//! pointed at them, and the guest state is checked after execution.
//!
//! Programs stop at a `BRK #0`, which surfaces as [`ExitReason::Breakpoint`], or through the
//! `exit` syscall, which surfaces as [`ExitReason::ExitRequested`].

use dbt_rs::{Dispatcher, ExitReason, GuestContext, Runtime};
use std::sync::atomic::{AtomicU64, Ordering};

const BRK: u32 = 0xd420_0000;

fn runtime() -> Runtime {
    let _ = env_logger::builder().is_test(true).try_init();

    Runtime::builder()
        .with_region_size(1 << 20)
        .with_cache_bits(8)
        .build()
        .unwrap()
}

fn run(runtime: &Runtime, ctx: &mut GuestContext) -> ExitReason {
    let mut dispatcher = Dispatcher::new(runtime);
    unsafe { dispatcher.run(ctx) }.unwrap()
}

fn expect_breakpoint(exit: ExitReason) -> u64 {
    match exit {
        ExitReason::Breakpoint { pc, .. } => pc,
        other => panic!("expected a breakpoint exit, got {other:?}"),
    }
}

#[test]
fn move_immediate_and_return() {
    let runtime = runtime();

    // MOVZ X0, #42; RET — with the link register aimed at a stop landing pad.
    let code: Vec<u32> = vec![0xd280_0540, 0xd65f_03c0];
    let pad = vec![BRK];

    let mut ctx = GuestContext::new(code.as_ptr() as u64);
    ctx.set_x(30, pad.as_ptr() as u64);

    let stop_pc = expect_breakpoint(run(&runtime, &mut ctx));

    assert_eq!(ctx.x(0), 42);
    assert_eq!(stop_pc, pad.as_ptr() as u64);
}

#[test]
fn add_with_flags_and_branch() {
    let runtime = runtime();

    // MOVZ X0, #1; MOVZ X1, #2; ADDS X2, X0, X1; B.EQ +8; MOVZ X3, #99; BRK.
    let code = vec![
        0xd280_0020,
        0xd280_0041,
        0xab01_0002,
        0x5400_0040,
        0xd280_0c63,
        BRK,
    ];

    let mut ctx = GuestContext::new(code.as_ptr() as u64);
    expect_breakpoint(run(&runtime, &mut ctx));

    assert_eq!(ctx.x(2), 3);
    // 1 + 2 is nonzero, so the EQ branch must fall through into the MOVZ.
    assert_eq!(ctx.x(3), 99);
}

#[test]
fn cbz_not_taken() {
    let runtime = runtime();

    // MOVZ X0, #5; CBZ X0, +8; MOVZ X1, #7; BRK.
    let code = vec![0xd280_00a0, 0xb400_0040, 0xd280_00e1, BRK];

    let mut ctx = GuestContext::new(code.as_ptr() as u64);
    expect_breakpoint(run(&runtime, &mut ctx));

    assert_eq!(ctx.x(1), 7);
}

#[test]
fn cbnz_taken_skips_instruction() {
    let runtime = runtime();

    // MOVZ X0, #1; CBNZ X0, +8; MOVZ X1, #7; BRK.
    let code = vec![0xd280_0020, 0xb500_0040, 0xd280_00e1, BRK];

    let mut ctx = GuestContext::new(code.as_ptr() as u64);
    expect_breakpoint(run(&runtime, &mut ctx));

    assert_eq!(ctx.x(1), 0);
}

#[test]
fn atomic_add_single_thread() {
    let runtime = runtime();
    let cell = AtomicU64::new(10);

    // MOVZ X0, #3; LDADDAL X0, X2, [X1]; BRK.
    let code = vec![0xd280_0060, 0xf8e0_0022, BRK];

    let mut ctx = GuestContext::new(code.as_ptr() as u64);
    ctx.set_x(1, &cell as *const AtomicU64 as u64);

    expect_breakpoint(run(&runtime, &mut ctx));

    assert_eq!(ctx.x(2), 10);
    assert_eq!(cell.load(Ordering::SeqCst), 13);
}

#[test]
fn atomic_add_two_threads() {
    const ITERS: u64 = 100_000;

    let runtime = runtime();
    let cell = AtomicU64::new(10);

    // MOVZ X0, #3;
    // loop: LDADDAL X0, X2, [X1]; SUBS X3, X3, #1; B.NE loop;
    // BRK.
    let code = vec![0xd280_0060, 0xf8e0_0022, 0xf100_0463, 0x54ff_ffc1, BRK];

    std::thread::scope(|scope| {
        for _ in 0..2 {
            scope.spawn(|| {
                let mut ctx = GuestContext::new(code.as_ptr() as u64);
                ctx.set_x(1, &cell as *const AtomicU64 as u64);
                ctx.set_x(3, ITERS);

                expect_breakpoint(run(&runtime, &mut ctx));
            });
        }
    });

    assert_eq!(cell.load(Ordering::SeqCst), 10 + 3 * 2 * ITERS);
}

#[test]
fn exclusive_pair_increments() {
    let runtime = runtime();
    let cell = AtomicU64::new(5);

    // LDAXR X2, [X1]; ADD X2, X2, #1; STLXR W3, X2, [X1]; CBNZ W3, -12; BRK.
    let code = vec![0xc85f_fc22, 0x9100_0442, 0xc803_fc22, 0x35ff_ffa3, BRK];

    let mut ctx = GuestContext::new(code.as_ptr() as u64);
    ctx.set_x(1, &cell as *const AtomicU64 as u64);

    expect_breakpoint(run(&runtime, &mut ctx));

    assert_eq!(cell.load(Ordering::SeqCst), 6);
    // The status register reads 0 after the successful store.
    assert_eq!(ctx.x(3), 0);
}

#[test]
fn exclusive_pair_race() {
    const ITERS: u64 = 50_000;

    let runtime = runtime();
    let cell = AtomicU64::new(0);

    // loop: LDAXR X2, [X1]; ADD X2, X2, #1; STLXR W3, X2, [X1]; CBNZ W3, loop;
    // SUBS X4, X4, #1; B.NE loop; BRK.
    let code = vec![
        0xc85f_fc22,
        0x9100_0442,
        0xc803_fc22,
        0x35ff_ffa3,
        0xf100_0484,
        0x54ff_ff61,
        BRK,
    ];

    std::thread::scope(|scope| {
        for _ in 0..2 {
            scope.spawn(|| {
                let mut ctx = GuestContext::new(code.as_ptr() as u64);
                ctx.set_x(1, &cell as *const AtomicU64 as u64);
                ctx.set_x(4, ITERS);

                expect_breakpoint(run(&runtime, &mut ctx));
            });
        }
    });

    assert_eq!(cell.load(Ordering::SeqCst), 2 * ITERS);
}

#[test]
fn neon_add_4s() {
    let runtime = runtime();

    // ADD V2.4S, V0.4S, V1.4S; BRK.
    let code = vec![0x4ea1_8402, BRK];

    let mut ctx = GuestContext::new(code.as_ptr() as u64);

    let pack = |lanes: [u32; 4]| -> u128 {
        lanes
            .iter()
            .enumerate()
            .fold(0u128, |acc, (i, &v)| acc | (u128::from(v) << (32 * i)))
    };

    ctx.set_v(0, pack([1, 2, 3, 4]));
    ctx.set_v(1, pack([10, 20, 30, 40]));

    expect_breakpoint(run(&runtime, &mut ctx));

    assert_eq!(ctx.v(2), pack([11, 22, 33, 44]));
}

#[test]
fn neon_compare_produces_lane_masks() {
    let runtime = runtime();

    // CMEQ V2.4S, V0.4S, V1.4S; BRK.
    let code = vec![0x6ea1_8402, BRK];

    let mut ctx = GuestContext::new(code.as_ptr() as u64);

    ctx.set_v_s(0, 0, 7);
    ctx.set_v_s(0, 1, 8);
    ctx.set_v_s(0, 2, 9);
    ctx.set_v_s(0, 3, 10);
    ctx.set_v_s(1, 0, 7);
    ctx.set_v_s(1, 1, 0);
    ctx.set_v_s(1, 2, 9);
    ctx.set_v_s(1, 3, 0);

    expect_breakpoint(run(&runtime, &mut ctx));

    assert_eq!(ctx.v_s(2, 0), 0xffff_ffff);
    assert_eq!(ctx.v_s(2, 1), 0);
    assert_eq!(ctx.v_s(2, 2), 0xffff_ffff);
    assert_eq!(ctx.v_s(2, 3), 0);
}

#[test]
fn neon_unsigned_compare() {
    let runtime = runtime();

    // CMHI V2.16B, V0.16B, V1.16B; BRK.
    let code = vec![0x6e21_3402, BRK];

    let mut ctx = GuestContext::new(code.as_ptr() as u64);

    // 0xff must compare above 0x01 as unsigned, below as signed.
    ctx.set_v(0, 0xff);
    ctx.set_v(1, 0x01);

    expect_breakpoint(run(&runtime, &mut ctx));

    assert_eq!(ctx.v_b(2, 0), 0xff);
    assert_eq!(ctx.v_b(2, 1), 0);
}

#[test]
fn load_store_roundtrip() {
    let runtime = runtime();
    let mut data = [0u64; 2];
    data[0] = 0x1122_3344_5566_7788;

    // LDR X2, [X1]; STR X2, [X1, #8]; BRK.
    let code = vec![0xf940_0022, 0xf900_0422, BRK];

    let mut ctx = GuestContext::new(code.as_ptr() as u64);
    ctx.set_x(1, data.as_mut_ptr() as u64);

    expect_breakpoint(run(&runtime, &mut ctx));

    assert_eq!(ctx.x(2), 0x1122_3344_5566_7788);
    assert_eq!(data[1], 0x1122_3344_5566_7788);
}

#[test]
fn stack_pair_push_pop() {
    let runtime = runtime();
    let mut stack = [0u64; 32];
    let top = unsafe { stack.as_mut_ptr().add(32) } as u64;

    // STP X0, X1, [SP, #-16]!; LDP X2, X3, [SP], #16; BRK.
    let code = vec![0xa9bf_07e0, 0xa8c1_0fe2, BRK];

    let mut ctx = GuestContext::new(code.as_ptr() as u64);
    ctx.set_sp(top);
    ctx.set_x(0, 0xaaaa);
    ctx.set_x(1, 0xbbbb);

    expect_breakpoint(run(&runtime, &mut ctx));

    assert_eq!(ctx.x(2), 0xaaaa);
    assert_eq!(ctx.x(3), 0xbbbb);
    assert_eq!(ctx.sp(), top);
}

#[test]
fn move_wide_composition() {
    let runtime = runtime();

    // MOVZ X0, #0x1234; MOVK X0, #0x5678, LSL #16; MOVK X0, #0x9abc, LSL #32; BRK.
    let code = vec![0xd282_4680, 0xf2aa_cf00, 0xf2d3_5780, BRK];

    let mut ctx = GuestContext::new(code.as_ptr() as u64);
    expect_breakpoint(run(&runtime, &mut ctx));

    assert_eq!(ctx.x(0), 0x0000_9abc_5678_1234);
}

#[test]
fn flags_materialize_into_nzcv() {
    let runtime = runtime();

    // CMP X0, X1; MRS X5, NZCV; BRK.
    let code = vec![0xeb01_001f, 0xd53b_4205, BRK];

    // 1 - 2: negative, borrow, so N set and C clear.
    let mut ctx = GuestContext::new(code.as_ptr() as u64);
    ctx.set_x(0, 1);
    ctx.set_x(1, 2);
    expect_breakpoint(run(&runtime, &mut ctx));
    assert_eq!(ctx.x(5), 0x8000_0000);

    // 2 - 1: positive, no borrow, so only C set.
    let mut ctx = GuestContext::new(code.as_ptr() as u64);
    ctx.set_x(0, 2);
    ctx.set_x(1, 1);
    expect_breakpoint(run(&runtime, &mut ctx));
    assert_eq!(ctx.x(5), 0x2000_0000);

    // Equal: zero and no borrow.
    let mut ctx = GuestContext::new(code.as_ptr() as u64);
    ctx.set_x(0, 7);
    ctx.set_x(1, 7);
    expect_breakpoint(run(&runtime, &mut ctx));
    assert_eq!(ctx.x(5), 0x6000_0000);
}

#[test]
fn condition_survives_flag_clobber() {
    let runtime = runtime();

    // CMP X0, X1; ADD X2, X2, #1; B.LO +8; MOVZ X3, #1; BRK.
    //
    // The ADD overwrites host flags between the compare and its consumer, forcing the branch
    // onto the stored-NZCV path.
    let code = vec![0xeb01_001f, 0x9100_0442, 0x5400_0043, 0xd280_0023, BRK];

    let mut ctx = GuestContext::new(code.as_ptr() as u64);
    ctx.set_x(0, 1);
    ctx.set_x(1, 2);
    expect_breakpoint(run(&runtime, &mut ctx));

    // 1 < 2 unsigned: the branch is taken and the MOVZ skipped.
    assert_eq!(ctx.x(3), 0);
    assert_eq!(ctx.x(2), 1);
}

#[test]
fn division_edges() {
    let runtime = runtime();

    // UDIV X2, X0, X1; SDIV X3, X0, X1; BRK.
    let code = vec![0x9ac1_0802, 0x9ac1_0c03, BRK];

    // Division by zero yields zero on both paths.
    let mut ctx = GuestContext::new(code.as_ptr() as u64);
    ctx.set_x(0, 1234);
    ctx.set_x(1, 0);
    expect_breakpoint(run(&runtime, &mut ctx));
    assert_eq!(ctx.x(2), 0);
    assert_eq!(ctx.x(3), 0);

    // INT_MIN / -1 wraps to INT_MIN instead of faulting.
    let mut ctx = GuestContext::new(code.as_ptr() as u64);
    ctx.set_x(0, i64::MIN as u64);
    ctx.set_x(1, u64::MAX);
    expect_breakpoint(run(&runtime, &mut ctx));
    assert_eq!(ctx.x(3), i64::MIN as u64);

    // An ordinary quotient.
    let mut ctx = GuestContext::new(code.as_ptr() as u64);
    ctx.set_x(0, 91);
    ctx.set_x(1, 7);
    expect_breakpoint(run(&runtime, &mut ctx));
    assert_eq!(ctx.x(2), 13);
    assert_eq!(ctx.x(3), 13);
}

#[test]
fn syscall_exit_stops_execution() {
    let runtime = runtime();

    // MOVZ X8, #93; SVC #0; BRK (never reached).
    let code = vec![0xd280_0ba8, 0xd400_0001, BRK];

    let mut ctx = GuestContext::new(code.as_ptr() as u64);
    let exit = run(&runtime, &mut ctx);

    assert!(matches!(exit, ExitReason::ExitRequested));
}

#[test]
fn unknown_instruction_reports_word_and_pc() {
    let runtime = runtime();

    // An unallocated word.
    let code = vec![0x0000_0000u32];
    let pc = code.as_ptr() as u64;

    let mut ctx = GuestContext::new(pc);

    match run(&runtime, &mut ctx) {
        ExitReason::UnknownInstruction { word, pc: fault_pc } => {
            assert_eq!(word, 0);
            assert_eq!(fault_pc, pc);
        }
        other => panic!("expected an unknown-instruction exit, got {other:?}"),
    }
}

#[test]
fn translation_cache_is_reused_across_runs() {
    let runtime = runtime();

    let code = vec![0xd280_0540, BRK]; // MOVZ X0, #42; BRK.

    for _ in 0..3 {
        let mut ctx = GuestContext::new(code.as_ptr() as u64);
        expect_breakpoint(run(&runtime, &mut ctx));
        assert_eq!(ctx.x(0), 42);
    }

    let stats = runtime.cache_stats();
    assert!(stats.hits >= 2, "expected cache hits, got {stats:?}");
    assert_eq!(runtime.region_stats().block_count, 1);
}

#[test]
fn ld1_multi_structure() {
    let runtime = runtime();
    let data: [u32; 4] = [1, 2, 3, 4];

    // LD1 {V0.4S}, [X1]; BRK.
    let code = vec![0x4c40_7820, BRK];

    let mut ctx = GuestContext::new(code.as_ptr() as u64);
    ctx.set_x(1, data.as_ptr() as u64);

    expect_breakpoint(run(&runtime, &mut ctx));

    for (lane, &value) in data.iter().enumerate() {
        assert_eq!(ctx.v_s(0, lane), value);
    }
}
