#![cfg(test)]
// Suppress 'unused' warnings for the testsuite
#![allow(unused)]

mod offset_test;
mod test_utils;
