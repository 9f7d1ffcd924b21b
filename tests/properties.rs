// tests/properties.rs
//! Property tests over randomly generated signatures.

use jni_callconv::{
    ArgPlacement, FrameOffset, HandleScope, InstructionSet, JniCallingConvention,
    ManagedRuntimeCallingConvention,
};
use proptest::{
    prelude::{Strategy, TestCaseError},
    prop_assert, prop_assert_eq,
    test_runner::TestRunner,
};

const RETURN_TYPES: [char; 10] = ['V', 'Z', 'B', 'C', 'S', 'I', 'J', 'F', 'D', 'L'];
const PARAM_TYPES: [char; 9] = ['Z', 'B', 'C', 'S', 'I', 'J', 'F', 'D', 'L'];
const ISAS: [InstructionSet; 4] = [
    InstructionSet::Arm,
    InstructionSet::Arm64,
    InstructionSet::Mips,
    InstructionSet::Mips64,
];

fn get_test_runner(cases: u32) -> TestRunner {
    TestRunner::new(proptest::test_runner::Config {
        cases,
        failure_persistence: None,

        ..proptest::test_runner::Config::default()
    })
}

fn shorty() -> impl Strategy<Value = String> {
    (
        proptest::sample::select(RETURN_TYPES.to_vec()),
        proptest::collection::vec(proptest::sample::select(PARAM_TYPES.to_vec()), 0..14),
    )
        .prop_map(|(ret, params)| std::iter::once(ret).chain(params).collect())
}

fn isa() -> impl Strategy<Value = InstructionSet> {
    proptest::sample::select(ISAS.to_vec())
}

fn aligns_wide_arguments(isa: InstructionSet) -> bool {
    matches!(isa, InstructionSet::Arm | InstructionSet::Mips)
}

fn check_jni_walk(conv: &JniCallingConvention, isa: InstructionSet) -> Result<(), TestCaseError> {
    let mut args = conv.args(FrameOffset(conv.out_arg_size()));
    let mut visited = 0;
    while args.has_next() {
        // Register/stack partition, and the matching query must not panic.
        prop_assert!(args.is_current_param_in_register() != args.is_current_param_on_stack());
        if args.is_current_param_in_register() {
            prop_assert!(!args.current_param_register().is_no_register());
        } else {
            prop_assert!(args.current_param_stack_offset().value() < conv.out_arg_size());
        }

        let width = if args.is_current_param_a_long_or_double() { 2 } else { 1 };
        let before = args.cursor().slots();
        args.advance();
        let delta = args.cursor().slots() - before;
        if aligns_wide_arguments(isa) {
            prop_assert!(delta == width || delta == width + 1);
            if delta == width + 1 {
                prop_assert_eq!(args.cursor().slots() % 2, 0);
            }
        } else {
            prop_assert_eq!(delta, width);
        }
        visited += 1;
    }
    prop_assert_eq!(
        visited,
        conv.num_args() + conv.number_of_extra_arguments_for_jni()
    );
    prop_assert_eq!(args.cursor().longs_and_doubles(), conv.num_long_or_double_args());
    if conv.has_handle_scope() {
        prop_assert_eq!(args.cursor().refs(), conv.reference_count());
    }
    Ok(())
}

#[test]
fn test_jni_walk_visits_every_argument() {
    get_test_runner(512)
        .run(
            &(
                isa(),
                shorty(),
                proptest::bool::ANY,
                proptest::bool::ANY,
            ),
            |(isa, shorty, is_static, is_critical_native)| {
                let conv =
                    JniCallingConvention::create(is_static, false, is_critical_native, &shorty, isa)
                        .unwrap();
                check_jni_walk(&conv, isa)
            },
        )
        .unwrap();
}

#[test]
fn test_managed_walk_visits_every_argument() {
    get_test_runner(512)
        .run(
            &(isa(), shorty(), proptest::bool::ANY),
            |(isa, shorty, is_static)| {
                let conv =
                    ManagedRuntimeCallingConvention::create(is_static, false, &shorty, isa)
                        .unwrap();
                let mut args = conv.args(FrameOffset(0));
                let mut visited = 0;
                while args.has_next() {
                    prop_assert!(args.is_current_param_on_stack());
                    prop_assert!(!args.is_current_param_in_register());
                    let width = if args.current_param_size() == 8 { 2 } else { 1 };
                    let before = args.cursor().slots();
                    args.advance();
                    prop_assert_eq!(args.cursor().slots() - before, width);
                    visited += 1;
                }
                prop_assert_eq!(visited, conv.num_args());

                // One spill record per 32-bit half at most, never more than the arguments.
                prop_assert!(conv.entry_spills().len() <= conv.num_args() + conv.num_long_or_double_args());
                Ok(())
            },
        )
        .unwrap();
}

#[test]
fn test_frame_sizes_are_aligned() {
    get_test_runner(512)
        .run(
            &(
                isa(),
                shorty(),
                proptest::bool::ANY,
                proptest::bool::ANY,
                proptest::bool::ANY,
            ),
            |(isa, shorty, is_static, is_synchronized, is_critical_native)| {
                let conv = JniCallingConvention::create(
                    is_static,
                    is_synchronized,
                    is_critical_native,
                    &shorty,
                    isa,
                )
                .unwrap();
                prop_assert_eq!(conv.frame_size() % 16, 0);
                prop_assert_eq!(conv.out_arg_size() % 16, 0);
                Ok(())
            },
        )
        .unwrap();
}

#[test]
fn test_critical_native_frame_is_no_larger() {
    get_test_runner(256)
        .run(&(isa(), shorty()), |(isa, shorty)| {
            let normal = JniCallingConvention::create(false, false, false, &shorty, isa).unwrap();
            let critical = JniCallingConvention::create(false, false, true, &shorty, isa).unwrap();
            prop_assert!(critical.frame_size() <= normal.frame_size());
            prop_assert!(!critical.has_handle_scope());
            prop_assert!(normal.has_handle_scope());
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_handle_scope_entries_are_packed() {
    get_test_runner(256)
        .run(
            &(isa(), shorty(), proptest::bool::ANY),
            |(isa, shorty, is_static)| {
                let conv =
                    JniCallingConvention::create(is_static, false, false, &shorty, isa).unwrap();
                let expected = conv.num_reference_args() + usize::from(is_static);
                prop_assert_eq!(conv.reference_count(), expected);

                let displacement = FrameOffset(conv.out_arg_size());
                let entries: Vec<_> = conv
                    .locations(displacement)
                    .filter_map(|loc| loc.handle_scope_entry)
                    .collect();
                prop_assert_eq!(entries.len(), conv.reference_count());
                prop_assert_eq!(entries[0], conv.handle_references_offset(displacement));
                for pair in entries.windows(2) {
                    prop_assert_eq!(
                        pair[1].value() - pair[0].value(),
                        conv.handle_scope_pointer_size()
                    );
                }

                // Header plus references matches the packed size.
                let pointer_size = conv.frame_pointer_size();
                prop_assert_eq!(
                    HandleScope::header_size(pointer_size)
                        + conv.reference_count() * conv.handle_scope_pointer_size(),
                    HandleScope::size_of(pointer_size, conv.reference_count())
                );
                Ok(())
            },
        )
        .unwrap();
}

#[test]
fn test_stack_arguments_stay_inside_out_area() {
    get_test_runner(256)
        .run(
            &(isa(), shorty(), proptest::bool::ANY),
            |(isa, shorty, is_static)| {
                let conv =
                    JniCallingConvention::create(is_static, false, false, &shorty, isa).unwrap();
                let mut stack_offsets = conv
                    .locations(FrameOffset(conv.out_arg_size()))
                    .filter_map(|loc| match loc.placement {
                        ArgPlacement::Stack(offset) => Some(offset.value()),
                        ArgPlacement::Register(_) => None,
                    })
                    .peekable();
                if stack_offsets.peek().is_some() {
                    prop_assert!(conv.number_of_outgoing_stack_args() > 0);
                }
                let offsets: Vec<_> = stack_offsets.collect();
                for pair in offsets.windows(2) {
                    prop_assert!(pair[0] < pair[1]);
                }
                Ok(())
            },
        )
        .unwrap();
}

#[test]
fn test_restarted_walks_repeat_the_same_locations() {
    get_test_runner(256)
        .run(
            &(
                isa(),
                shorty(),
                proptest::bool::ANY,
                proptest::bool::ANY,
                0usize..20,
            ),
            |(isa, shorty, is_static, is_critical_native, prefix)| {
                let conv =
                    JniCallingConvention::create(is_static, false, is_critical_native, &shorty, isa)
                        .unwrap();
                let displacement = FrameOffset(conv.out_arg_size());
                let first: Vec<_> = conv.locations(displacement).collect();
                let second: Vec<_> = conv.locations(displacement).collect();
                prop_assert_eq!(&first, &second);

                let mut args = conv.args(displacement);
                for _ in 0..prefix.min(first.len()) {
                    args.advance();
                }
                args.reset(displacement);
                let restarted: Vec<_> = args.into_iter().collect();
                prop_assert_eq!(&first, &restarted);

                let managed =
                    ManagedRuntimeCallingConvention::create(is_static, false, &shorty, isa)
                        .unwrap();
                let expected: Vec<_> = managed.locations(FrameOffset(0)).collect();
                let mut args = managed.args(FrameOffset(0));
                for _ in 0..prefix.min(expected.len()) {
                    args.advance();
                }
                args.reset(FrameOffset(0));
                prop_assert_eq!(expected, args.into_iter().collect::<Vec<_>>());
                Ok(())
            },
        )
        .unwrap();
}
