mod configuration_service_tests;
