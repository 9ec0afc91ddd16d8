mod prediction_log;
