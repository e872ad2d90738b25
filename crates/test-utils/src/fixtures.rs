//! Captured load-generator output used across tile-bench tests.
//!
//! The texts follow Apache Bench 2.3 output byte-for-byte apart from the
//! hostnames.

/// A complete run: 5000 requests at c=10, 50 failures.
pub const AB_COMPLETE: &str = r#"This is ApacheBench, Version 2.3 <$Revision: 1903618 $>
Copyright 1996 Adam Twiss, Zeus Technology Ltd, http://www.zeustech.net/
Licensed to The Apache Software Foundation, http://www.apache.org/

Benchmarking tiles.example.org (be patient)
Completed 500 requests
Completed 1000 requests
Completed 1500 requests
Completed 2000 requests
Completed 2500 requests
Completed 3000 requests
Completed 3500 requests
Completed 4000 requests
Completed 4500 requests
Completed 5000 requests
Finished 5000 requests


Server Software:        nginx/1.18.0
Server Hostname:        tiles.example.org
Server Port:            443
SSL/TLS Protocol:       TLSv1.2,ECDHE-RSA-AES256-GCM-SHA384,2048,256
TLS Server Name:        tiles.example.org

Document Path:          /geoserver/gwc/service/wmts?SERVICE=WMTS&REQUEST=GetTile&VERSION=1.0.0&LAYER=bkb_2024&STYLE=&TILEMATRIXSET=WebMercatorQuad&TILEMATRIX=8&TILEROW=84&TILECOL=133&FORMAT=image/png
Document Length:        8734 bytes

Concurrency Level:      10
Time taken for tests:   5.902 seconds
Complete requests:      5000
Failed requests:        50
   (Connect: 0, Receive: 0, Length: 50, Exceptions: 0)
Total transferred:      45170000 bytes
HTML transferred:       43670000 bytes
Requests per second:    847.23 [#/sec] (mean)
Time per request:       11.803 [ms] (mean)
Time per request:       1.180 [ms] (mean, across all concurrent requests)
Transfer rate:          7474.19 [Kbytes/sec] received

Connection Times (ms)
              min  mean[+/-sd] median   max
Connect:        3    5   1.2      5      14
Processing:     4    7   2.3      6      31
Waiting:        3    6   2.1      6      29
Total:          7   12   2.8     11      38

Percentage of the requests served within a certain time (ms)
  50%     11
  66%     12
  75%     13
  80%     13
  90%     15
  95%     17
  98%     20
  99%     23
 100%     38 (longest request)
"#;

/// Same run as [`AB_COMPLETE`] without the transfer rate line.
pub const AB_NO_TRANSFER_RATE: &str = r#"Concurrency Level:      10
Time taken for tests:   5.902 seconds
Complete requests:      5000
Failed requests:        50
Requests per second:    847.23 [#/sec] (mean)
Time per request:       11.803 [ms] (mean)
Time per request:       1.180 [ms] (mean, across all concurrent requests)
"#;

/// A run where the server answered with errors that ab counts separately.
pub const AB_NON_2XX: &str = r#"Concurrency Level:      1
Time taken for tests:   2.000 seconds
Complete requests:      100
Failed requests:        0
Non-2xx responses:      100
Total transferred:      31200 bytes
HTML transferred:       12000 bytes
Requests per second:    50.00 [#/sec] (mean)
Time per request:       20.000 [ms] (mean)
Time per request:       20.000 [ms] (mean, across all concurrent requests)
Transfer rate:          15.23 [Kbytes/sec] received
"#;

/// ab aborted part way through; stderr text appended by the runner.
pub const AB_ABORTED: &str = r#"Benchmarking tiles.example.org (be patient)
Completed 500 requests
apr_socket_recv: Connection reset by peer (104)
Total of 612 requests completed
"#;

/// Output whose numbers use a comma as decimal separator.
pub const AB_COMMA_DECIMALS: &str = r#"Complete requests:      1000
Failed requests:        3
Requests per second:    120,50 [#/sec] (mean)
Time per request:       83,0 [ms] (mean)
Transfer rate:          900.10 [Kbytes/sec] received
"#;

/// Timing file written by `ab -g`: tab separated, total time in `ttime`.
pub const AB_GNUPLOT: &str = "starttime\tseconds\tctime\tdtime\tttime\twait
Thu Nov 14 12:30:01 2024\t1731587401\t3\t8\t11\t8
Thu Nov 14 12:30:01 2024\t1731587401\t4\t6\t10\t6
Thu Nov 14 12:30:01 2024\t1731587401\t2\t10\t12\t9
Thu Nov 14 12:30:02 2024\t1731587402\t5\t15\t20\t14
Thu Nov 14 12:30:02 2024\t1731587402\t3\t4\t7\t4
garbage line
";

/// Render an ab-style summary block with the four core metrics.
pub fn ab_output(concurrency: u32, complete: u64, failed: u64, rps: f64, mean_ms: f64, kbps: f64) -> String {
    format!(
        "Concurrency Level:      {concurrency}\n\
         Time taken for tests:   {secs:.3} seconds\n\
         Complete requests:      {complete}\n\
         Failed requests:        {failed}\n\
         Requests per second:    {rps:.2} [#/sec] (mean)\n\
         Time per request:       {mean_ms:.3} [ms] (mean)\n\
         Time per request:       {across:.3} [ms] (mean, across all concurrent requests)\n\
         Transfer rate:          {kbps:.2} [Kbytes/sec] received\n",
        secs = if rps > 0.0 { complete as f64 / rps } else { 0.0 },
        across = mean_ms / concurrency.max(1) as f64,
    )
}
