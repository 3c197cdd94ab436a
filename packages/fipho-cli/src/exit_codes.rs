/// Process exit codes shared by all subcommands.
pub const SUCCESS: i32 = 0;
/// Invalid input file or parameters.
pub const INPUT_ERROR: i32 = 2;
/// Pipeline or output writing failed.
pub const EXECUTION_ERROR: i32 = 3;
/// Some recording sides or sessions succeeded, others failed.
pub const PARTIAL_FAILURE: i32 = 4;
