mod helpers;

mod merge_tests;
mod recovery_tests;
