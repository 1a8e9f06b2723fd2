mod workspace_tests;
