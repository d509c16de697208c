mod default_tests;
mod serialization_tests;
mod validation_tests;
