mod selector_tests;
