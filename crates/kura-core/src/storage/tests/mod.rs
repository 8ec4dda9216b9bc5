mod directory_tests;
mod registry_tests;
